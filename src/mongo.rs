//! MongoDB implementation of [`Driver`]
//!
//! Wraps the official `mongodb` crate. A session counts as established once
//! the target database answers a `ping`. Server heartbeats drive the
//! `Disconnected`/`Reconnected` events: the first failed heartbeat after a
//! healthy period reports a disconnect, the next successful one a reconnect.
//! With a replica set any single member's failed heartbeat counts.

use crate::config::{ConnectionOptions, TlsPolicy};
use crate::driver::{Driver, DriverEvent, EventListener, SessionInfo};
use crate::errors::{DriverError, DriverErrorKind};
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::event::sdam::SdamEvent;
use mongodb::event::EventHandler;
use mongodb::options::{ClientOptions, Tls, TlsOptions};
use mongodb::Client;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

const FALLBACK_DATABASE: &str = "admin";

/// Listeners and heartbeat bookkeeping shared with the driver's event callback
#[derive(Default)]
struct Shared {
    listeners: RwLock<Vec<EventListener>>,
    healthy: AtomicBool,
    /// Generation of the client whose events are currently reported
    active_generation: AtomicU64,
}

impl Shared {
    fn emit(&self, event: &DriverEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(event.clone());
        }
    }
}

/// [`Driver`] backed by a `mongodb::Client`
pub struct MongoDriver {
    client: RwLock<Option<Client>>,
    shared: Arc<Shared>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for MongoDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDriver")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Default for MongoDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MongoDriver {
    /// Driver with no client yet
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
            shared: Arc::new(Shared::default()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Client of the current session, for issuing queries
    #[must_use]
    pub fn client(&self) -> Option<Client> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn heartbeat_handler(&self, generation: u64) -> EventHandler<SdamEvent> {
        let shared = Arc::clone(&self.shared);
        EventHandler::callback(move |event: SdamEvent| {
            // Events from clients that never finished connecting, or were replaced, are dropped
            if shared.active_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            match event {
                SdamEvent::ServerHeartbeatFailed(failed) => {
                    shared.emit(&DriverEvent::Error(failed.failure.to_string()));
                    if shared.healthy.swap(false, Ordering::SeqCst) {
                        shared.emit(&DriverEvent::Disconnected);
                    }
                }
                SdamEvent::ServerHeartbeatSucceeded(_) => {
                    if !shared.healthy.swap(true, Ordering::SeqCst) {
                        shared.emit(&DriverEvent::Reconnected);
                    }
                }
                _ => {}
            }
        })
    }
}

#[async_trait]
impl Driver for MongoDriver {
    async fn connect(&self, options: &ConnectionOptions) -> Result<SessionInfo, DriverError> {
        let mut client_options = ClientOptions::parse(options.uri.as_str())
            .await
            .map_err(|e| driver_error(&e))?;

        client_options.max_pool_size = Some(options.max_pool_size);
        client_options.min_pool_size = Some(options.min_pool_size);
        client_options.server_selection_timeout = Some(options.server_selection_timeout);
        // No inactivity timeout in this driver; bound connection setup instead
        client_options.connect_timeout = Some(options.socket_timeout);
        client_options.tls = Some(tls_setting(&options.tls));

        debug!(
            address_family = ?options.address_family,
            buffer_commands = options.buffer_commands,
            allow_invalid_hostnames = ?options.tls.allow_invalid_hostnames,
            "Options without a driver equivalent are not applied"
        );

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        client_options.sdam_event_handler = Some(self.heartbeat_handler(generation));

        let host = client_options
            .hosts
            .first()
            .map(ToString::to_string)
            .unwrap_or_default();
        let database = client_options.default_database.clone().unwrap_or_default();

        let client = Client::with_options(client_options).map_err(|e| driver_error(&e))?;
        let target = if database.is_empty() {
            FALLBACK_DATABASE
        } else {
            database.as_str()
        };
        client
            .database(target)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| driver_error(&e))?;

        self.shared.healthy.store(true, Ordering::SeqCst);
        self.shared
            .active_generation
            .store(generation, Ordering::SeqCst);
        *self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(client);

        Ok(SessionInfo::new(host, database))
    }

    fn is_active(&self) -> bool {
        self.shared.healthy.load(Ordering::SeqCst)
            && self
                .client
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }

    fn subscribe(&self, listener: EventListener) {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}

fn tls_setting(policy: &TlsPolicy) -> Tls {
    if !policy.enabled {
        return Tls::Disabled;
    }
    let mut tls_options = TlsOptions::default();
    tls_options.allow_invalid_certificates = policy.allow_invalid_certificates;
    Tls::Enabled(tls_options)
}

/// Map a `mongodb` error onto a structured kind.
///
/// I/O and server-selection failures carry the underlying handshake error in
/// their message, so they stay `Unknown` and the message heuristic decides.
fn driver_error_kind(error: &MongoError) -> DriverErrorKind {
    match error.kind.as_ref() {
        ErrorKind::InvalidArgument { .. } | ErrorKind::InvalidTlsConfig { .. } => {
            DriverErrorKind::Configuration
        }
        ErrorKind::Authentication { .. } => DriverErrorKind::Authentication,
        ErrorKind::DnsResolve { .. } => DriverErrorKind::Network,
        _ => DriverErrorKind::Unknown,
    }
}

fn driver_error(error: &MongoError) -> DriverError {
    DriverError::new(driver_error_kind(error), error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_setting_follows_policy() {
        assert!(matches!(tls_setting(&TlsPolicy::relaxed()), Tls::Disabled));

        match tls_setting(&TlsPolicy::default()) {
            Tls::Enabled(options) => {
                assert_eq!(options.allow_invalid_certificates, Some(false));
            }
            _ => panic!("TLS should be enabled"),
        }
    }

    #[test]
    fn test_new_driver_is_inactive() {
        let driver = MongoDriver::new();
        assert!(!driver.is_active());
        assert!(driver.client().is_none());
    }

    #[tokio::test]
    async fn test_malformed_uri_is_configuration_error() {
        let driver = MongoDriver::new();
        let err = driver
            .connect(&ConnectionOptions::new("mongodb://"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Configuration);
        assert!(!driver.is_active());
    }
}
