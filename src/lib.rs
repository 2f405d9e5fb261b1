//! `insightlink` - connection lifecycle for the analytics document store
//!
//! This library keeps one logical database connection per process alive
//! across repeated, possibly concurrent, handler invocations.

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/// Command line interface
pub mod cli;
/// CLI command handlers
pub mod commands;
/// Configuration loading and connection options
pub mod config;
/// Driver abstraction
pub mod driver;
pub mod errors;
pub mod health;
pub mod manager;
pub mod mongo;
pub mod retry;

pub use config::{Config, ConnectionOptions, TlsPolicy};
pub use driver::{Driver, DriverEvent, SessionInfo};
pub use errors::{ConnectionError, DriverError, DriverErrorKind};
pub use manager::{ConnectionManager, ConnectionState};
pub use mongo::MongoDriver;
pub use retry::RetryPolicy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
