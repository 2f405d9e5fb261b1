//! Error handling for connection management
//!
//! Drivers report failures as [`DriverError`]s carrying a structured
//! [`DriverErrorKind`]. [`FailureClass::classify`] decides which of those are
//! worth retrying, and the manager surfaces a [`ConnectionError`] to callers.

use crate::config::ConfigError;
use std::fmt;
use thiserror::Error;

/// Message fragments that mark a TLS/SSL handshake failure when the driver
/// gives no structured kind. Matched case-sensitively.
pub const TLS_MARKERS: [&str; 3] = ["SSL", "TLS", "tls"];

/// Structured category of a driver failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// TLS/SSL negotiation failed
    Tls,
    /// Connection string or options were rejected
    Configuration,
    /// Credentials were rejected
    Authentication,
    /// Host unreachable, DNS failure, connection reset
    Network,
    /// No server answered within the configured timeouts
    Timeout,
    /// The driver did not say
    Unknown,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tls => "tls",
            Self::Configuration => "configuration",
            Self::Authentication => "authentication",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`Driver`](crate::driver::Driver)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    /// Structured category
    pub kind: DriverErrorKind,
    /// Human-readable message as produced by the driver
    pub message: String,
}

impl DriverError {
    /// Create a driver error
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Error with no structured kind; only its message can be inspected
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Unknown, message)
    }

    /// Whether the message carries one of the [`TLS_MARKERS`]
    #[must_use]
    pub fn has_tls_marker(&self) -> bool {
        TLS_MARKERS.iter().any(|marker| self.message.contains(marker))
    }
}

/// How the connect path treats a driver failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Bad connection string or options; never retried
    Configuration,
    /// Handshake failure; retried with a relaxed TLS policy
    TransientTls,
    /// Anything else; surfaced immediately
    Other,
}

impl FailureClass {
    /// Classify a driver failure.
    ///
    /// The structured kind wins. Only errors of [`DriverErrorKind::Unknown`]
    /// fall back to scanning the message for [`TLS_MARKERS`], which breaks if
    /// a driver localises or rewords its messages.
    #[must_use]
    pub fn classify(error: &DriverError) -> Self {
        match error.kind {
            DriverErrorKind::Tls => Self::TransientTls,
            DriverErrorKind::Configuration => Self::Configuration,
            DriverErrorKind::Authentication
            | DriverErrorKind::Network
            | DriverErrorKind::Timeout => Self::Other,
            DriverErrorKind::Unknown if error.has_tls_marker() => Self::TransientTls,
            DriverErrorKind::Unknown => Self::Other,
        }
    }
}

/// Error returned by [`ConnectionManager::connect`](crate::ConnectionManager::connect)
///
/// `Clone` so every caller sharing one in-flight attempt receives the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Missing or malformed connection string or options
    #[error("Configuration error: {details}")]
    Configuration {
        /// What was wrong
        details: String,
    },

    /// Every attempt failed during the TLS handshake
    #[error("TLS handshake failed after {attempts} attempts: {message}")]
    TlsExhausted {
        /// Physical attempts made, including the first
        attempts: u32,
        /// Message of the last failure
        message: String,
    },

    /// Any other connect failure
    #[error("Connection failed ({kind}): {message}")]
    Connection {
        /// Structured category reported by the driver
        kind: DriverErrorKind,
        /// Driver message
        message: String,
    },
}

impl From<ConfigError> for ConnectionError {
    fn from(error: ConfigError) -> Self {
        Self::Configuration {
            details: error.to_string(),
        }
    }
}

impl ConnectionError {
    /// Whether calling `connect()` again later could succeed without a
    /// configuration change
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration { .. } => false,
            Self::TlsExhausted { .. } => true,
            Self::Connection { kind, .. } => !matches!(
                kind,
                DriverErrorKind::Authentication | DriverErrorKind::Configuration
            ),
        }
    }

    /// Short message suitable for a failed request's response
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration { details } => format!("Database is misconfigured: {details}"),
            Self::TlsExhausted { .. } => {
                "Database is unreachable: secure connection could not be negotiated".to_string()
            }
            Self::Connection { kind, .. } => format!("Database is unavailable ({kind})"),
        }
    }
}
