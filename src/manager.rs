//! # Connection Lifecycle Manager
//!
//! Owns the single logical database connection of the process. Request
//! handlers call [`ConnectionManager::connect`] before touching the database;
//! the call is cheap once a session exists and safe to issue concurrently.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use insightlink::{Config, ConnectionManager, MongoDriver};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = Config::load(None)?.connection_options()?;
//! let manager = ConnectionManager::new(Arc::new(MongoDriver::new()), options);
//!
//! // in each request handler
//! manager.connect().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::ConnectionOptions;
use crate::driver::{Driver, DriverEvent, EventListener, SessionInfo};
use crate::errors::ConnectionError;
use crate::health::{ConnectionCounters, ConnectionStats, HealthReport, HealthStatus};
use crate::retry::{connect_with_retry, RetryPolicy};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Local view of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; the next `connect()` dials out
    Disconnected,
    /// A physical connection attempt is in flight
    Connecting,
    /// A session is established
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

type DialFuture = BoxFuture<'static, Result<(), ConnectionError>>;
type Flight = Shared<DialFuture>;

/// Slot for the attempt currently in flight.
///
/// Holds a weak handle only: once every caller has dropped an attempt it is
/// freed, together with the `Arc<Inner>` it captured.
#[derive(Default)]
struct InFlight {
    next_id: u64,
    current: Option<(u64, WeakShared<DialFuture>)>,
}

/// State shared between the manager and its driver event listener
struct Status {
    state: watch::Sender<ConnectionState>,
    session: RwLock<Option<SessionInfo>>,
}

impl Status {
    fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            session: RwLock::new(None),
        }
    }

    fn get(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn session(&self) -> Option<SessionInfo> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Back to `Disconnected` unless an outcome was already recorded
    fn abandon_connecting(&self) {
        self.state.send_if_modified(|current| {
            let connecting = *current == ConnectionState::Connecting;
            if connecting {
                *current = ConnectionState::Disconnected;
            }
            connecting
        });
    }

    fn record_session(&self, session: SessionInfo) {
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.set(ConnectionState::Connected);
    }
}

struct Inner {
    driver: Arc<dyn Driver>,
    options: ConnectionOptions,
    policy: RetryPolicy,
    status: Arc<Status>,
    counters: Arc<ConnectionCounters>,
    in_flight: Mutex<InFlight>,
}

/// Manages the lifecycle of one logical database connection
///
/// Cloning is cheap; clones share the same connection state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("uri", &self.inner.options.redacted_uri())
            .field("state", &self.state())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager with the default retry policy
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, options: ConnectionOptions) -> Self {
        Self::with_policy(driver, options, RetryPolicy::default())
    }

    /// Create a manager with a custom retry policy.
    ///
    /// Subscribes to driver events exactly once, here.
    #[must_use]
    pub fn with_policy(
        driver: Arc<dyn Driver>,
        options: ConnectionOptions,
        policy: RetryPolicy,
    ) -> Self {
        let status = Arc::new(Status::new());
        let counters = Arc::new(ConnectionCounters::default());
        driver.subscribe(event_listener(Arc::clone(&status), Arc::clone(&counters)));

        Self {
            inner: Arc::new(Inner {
                driver,
                options,
                policy,
                status,
                counters,
                in_flight: Mutex::new(InFlight::default()),
            }),
        }
    }

    /// Ensure a live session exists.
    ///
    /// Returns immediately when connected. Adopts a session the driver holds
    /// even if local state was lost. Otherwise dials out; concurrent callers
    /// share a single in-flight attempt and its result.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let driver_active = self.inner.driver.is_active();

        if driver_active && self.state() == ConnectionState::Connected {
            info!("Using existing database connection");
            return Ok(());
        }

        if driver_active {
            self.inner.status.set(ConnectionState::Connected);
            info!("Reusing active database connection");
            return Ok(());
        }

        self.join_or_start_flight().await
    }

    fn join_or_start_flight(&self) -> Flight {
        let mut slot = lock(&self.inner.in_flight);
        if let Some(flight) = slot.current.as_ref().and_then(|(_, weak)| weak.upgrade()) {
            debug!("Joining in-flight connection attempt");
            return flight;
        }

        slot.next_id += 1;
        let id = slot.next_id;
        let inner = Arc::clone(&self.inner);
        let flight = async move { inner.dial(id).await }.boxed().shared();
        slot.current = flight.downgrade().map(|weak| (id, weak));
        flight
    }

    /// Current local state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.status.get()
    }

    /// Receiver that observes every state change
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status.state.subscribe()
    }

    /// Whether local state is `Connected`
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Last session recorded by a successful connect
    #[must_use]
    pub fn session(&self) -> Option<SessionInfo> {
        self.inner.status.session()
    }

    /// Options every attempt starts from
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.inner.counters.snapshot()
    }

    /// Combine local state, driver truth and counters into a report
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let state = self.state();
        let driver_active = self.inner.driver.is_active();
        HealthReport {
            status: HealthStatus::evaluate(state, driver_active),
            state,
            driver_active,
            session: self.session(),
            stats: self.stats(),
            checked_at: Utc::now(),
        }
    }
}

impl Inner {
    async fn dial(&self, flight: u64) -> Result<(), ConnectionError> {
        // Runs on every exit: normal return, driver panic, or cancellation.
        let _landing = FlightLanding {
            inner: self,
            flight,
        };
        self.status.set(ConnectionState::Connecting);

        let result = self.try_dial().await;
        match &result {
            Ok(session) => {
                self.status.record_session(session.clone());
                info!(
                    host = %session.host,
                    database = %session.database,
                    "Database connected successfully"
                );
            }
            Err(err) => {
                self.counters.record_failure(&err.to_string());
                error!(error = %err, detail = ?err, "Database connection failed");
                self.status.set(ConnectionState::Disconnected);
            }
        }

        result.map(|_| ())
    }

    async fn try_dial(&self) -> Result<SessionInfo, ConnectionError> {
        self.options.validate()?;
        info!(uri = %self.options.redacted_uri(), "Attempting database connection");
        connect_with_retry(
            self.driver.as_ref(),
            &self.options,
            &self.policy,
            &self.counters,
        )
        .await
    }
}

/// Ends an attempt: frees its slot so the next caller dials afresh, and
/// leaves `Connecting` if the attempt never got to record an outcome
struct FlightLanding<'a> {
    inner: &'a Inner,
    flight: u64,
}

impl Drop for FlightLanding<'_> {
    fn drop(&mut self) {
        {
            let mut slot = lock(&self.inner.in_flight);
            if matches!(slot.current, Some((id, _)) if id == self.flight) {
                slot.current = None;
            }
        }

        if std::thread::panicking() {
            warn!("Database connection attempt panicked");
        }
        self.inner.status.abandon_connecting();
    }
}

fn event_listener(status: Arc<Status>, counters: Arc<ConnectionCounters>) -> EventListener {
    Arc::new(move |event: DriverEvent| {
        counters.record_event(&event);
        match event {
            DriverEvent::Error(message) => {
                error!(error = %message, "Database connection error");
            }
            DriverEvent::Disconnected => {
                warn!("Database disconnected");
                status.set(ConnectionState::Disconnected);
            }
            DriverEvent::Reconnected => {
                info!("Database reconnected");
                status.set(ConnectionState::Connected);
            }
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
