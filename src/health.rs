//! Connection health reporting
//!
//! This module provides:
//! - Counters for connect attempts, TLS retries and driver events
//! - Point-in-time health reports combining local state with driver truth

use crate::driver::{DriverEvent, SessionInfo};
use crate::manager::ConnectionState;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Overall health of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Connected and the driver agrees
    Healthy,
    /// Local state and driver disagree; the next `connect()` reconciles them
    Degraded,
    /// No usable session
    Unavailable,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "HEALTHY"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
        }
    }
}

impl HealthStatus {
    /// Derive status from local state and the driver's own view
    #[must_use]
    pub const fn evaluate(state: ConnectionState, driver_active: bool) -> Self {
        match (state, driver_active) {
            (ConnectionState::Connected, true) => Self::Healthy,
            (ConnectionState::Connected, false) | (_, true) => Self::Degraded,
            _ => Self::Unavailable,
        }
    }
}

/// Snapshot of connection counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Physical connect calls issued to the driver
    pub attempts: u64,
    /// Attempts that were retries with relaxed TLS
    pub tls_retries: u64,
    /// `connect()` calls that ended in failure
    pub failed_connects: u64,
    /// Driver error events seen
    pub error_events: u64,
    /// Driver disconnect events seen
    pub disconnect_events: u64,
    /// Driver reconnect events seen
    pub reconnect_events: u64,
    /// Message of the most recent failure
    pub last_error: Option<String>,
}

/// Live counters shared by the connect path and the event listener
#[derive(Debug, Default)]
pub struct ConnectionCounters {
    attempts: AtomicU64,
    tls_retries: AtomicU64,
    failed_connects: AtomicU64,
    error_events: AtomicU64,
    disconnect_events: AtomicU64,
    reconnect_events: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ConnectionCounters {
    /// Count a physical connect call
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a retry with relaxed TLS
    pub fn record_tls_retry(&self) {
        self.tls_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed `connect()` and remember why
    pub fn record_failure(&self, message: &str) {
        self.failed_connects.fetch_add(1, Ordering::Relaxed);
        self.set_last_error(message);
    }

    /// Count a driver event
    pub fn record_event(&self, event: &DriverEvent) {
        match event {
            DriverEvent::Error(message) => {
                self.error_events.fetch_add(1, Ordering::Relaxed);
                self.set_last_error(message);
            }
            DriverEvent::Disconnected => {
                self.disconnect_events.fetch_add(1, Ordering::Relaxed);
            }
            DriverEvent::Reconnected => {
                self.reconnect_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn set_last_error(&self, message: &str) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    /// Take a snapshot
    #[must_use]
    pub fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            tls_retries: self.tls_retries.load(Ordering::Relaxed),
            failed_connects: self.failed_connects.load(Ordering::Relaxed),
            error_events: self.error_events.load(Ordering::Relaxed),
            disconnect_events: self.disconnect_events.load(Ordering::Relaxed),
            reconnect_events: self.reconnect_events.load(Ordering::Relaxed),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Point-in-time health of a [`ConnectionManager`](crate::ConnectionManager)
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// Local connection state
    pub state: ConnectionState,
    /// Whether the driver reports a usable session
    pub driver_active: bool,
    /// Last recorded session, if any
    pub session: Option<SessionInfo>,
    /// Counters at the time of the check
    pub stats: ConnectionStats,
    /// When the report was taken
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Whether requests can be served
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Time since the session was established
    #[must_use]
    pub fn uptime(&self) -> Option<chrono::Duration> {
        self.session
            .as_ref()
            .filter(|_| self.state == ConnectionState::Connected)
            .map(|session| self.checked_at - session.connected_at)
    }
}
