//! Seam between the connection manager and the database driver

use crate::config::ConnectionOptions;
use crate::errors::DriverError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Background notification from the driver about its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// The driver hit an error; the session may still be usable
    Error(String),
    /// The session was lost
    Disconnected,
    /// The driver re-established a lost session on its own
    Reconnected,
}

/// Callback receiving [`DriverEvent`]s
pub type EventListener = Arc<dyn Fn(DriverEvent) + Send + Sync>;

/// Description of a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Host the session is attached to
    pub host: String,
    /// Logical database name, empty if the URI named none
    pub database: String,
    /// When the session was established
    pub connected_at: DateTime<Utc>,
}

impl SessionInfo {
    /// Session established now
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            connected_at: Utc::now(),
        }
    }
}

/// Document-store driver the manager orchestrates
///
/// Implementations own the wire protocol, pooling and background
/// reconnection; the manager only mirrors what they report.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a session with the given options
    async fn connect(&self, options: &ConnectionOptions) -> Result<SessionInfo, DriverError>;

    /// Whether the driver currently holds a usable session
    fn is_active(&self) -> bool;

    /// Register a listener for session events
    fn subscribe(&self, listener: EventListener);
}
