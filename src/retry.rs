//! Bounded retry of the raw connect call
//!
//! Only TLS/SSL handshake failures are retried, each time with TLS switched
//! off and certificate/hostname validation deferred to the driver. Everything
//! else is surfaced on the first failure.

use crate::config::ConnectionOptions;
use crate::driver::{Driver, SessionInfo};
use crate::errors::{ConnectionError, FailureClass};
use crate::health::ConnectionCounters;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff strategy to use
    pub backoff_strategy: BackoffStrategy,

    /// Whether to add jitter to delays
    pub jitter: bool,
}

/// Backoff strategies for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,

    /// Exponential backoff (delay doubles each time)
    Exponential,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(5),
            backoff_strategy: BackoffStrategy::Fixed,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of retries after the first attempt
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set initial delay
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff strategy
    #[must_use]
    pub const fn with_backoff_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts this policy allows
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based)
    #[must_use]
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let base_delay = match self.backoff_strategy {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Exponential => {
                let multiplier = 2_u32.saturating_pow(retry.saturating_sub(1));
                self.initial_delay.saturating_mul(multiplier)
            }
        };

        let mut delay = base_delay.min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            #[allow(clippy::cast_precision_loss)]
            let jitter_amount = delay.as_millis() as f64 * 0.1; // 10% jitter
            let jitter = (fastrand::f64() * jitter_amount).mul_add(2.0, -jitter_amount);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let jitter_duration = Duration::from_millis(jitter.abs() as u64);

            if jitter >= 0.0 {
                delay += jitter_duration;
            } else {
                delay = delay.saturating_sub(jitter_duration);
            }
        }

        delay
    }
}

/// Issue the raw connect call, retrying TLS handshake failures with relaxed
/// TLS until the policy is exhausted.
///
/// Every physical call is counted in `counters`.
pub async fn connect_with_retry(
    driver: &dyn Driver,
    options: &ConnectionOptions,
    policy: &RetryPolicy,
    counters: &ConnectionCounters,
) -> Result<SessionInfo, ConnectionError> {
    let relaxed = options.relaxed_tls();
    let mut attempt: u32 = 1;

    loop {
        let current = if attempt == 1 { options } else { &relaxed };
        debug!(
            "Connect attempt {}/{} (tls={})",
            attempt,
            policy.max_attempts(),
            current.tls.enabled
        );
        counters.record_attempt();

        let error = match driver.connect(current).await {
            Ok(session) => {
                if attempt > 1 {
                    info!("Connected on attempt {} with relaxed TLS", attempt);
                }
                return Ok(session);
            }
            Err(error) => error,
        };

        match FailureClass::classify(&error) {
            FailureClass::TransientTls if attempt <= policy.max_retries => {
                warn!(
                    "TLS connection attempt {} failed, retrying with adjusted settings: {}",
                    attempt, error
                );
                counters.record_tls_retry();
                let delay = policy.calculate_delay(attempt);
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                attempt += 1;
            }
            FailureClass::TransientTls => {
                return Err(ConnectionError::TlsExhausted {
                    attempts: attempt,
                    message: error.message,
                });
            }
            FailureClass::Configuration => {
                return Err(ConnectionError::Configuration {
                    details: error.message,
                });
            }
            FailureClass::Other => {
                return Err(ConnectionError::Connection {
                    kind: error.kind,
                    message: error.message,
                });
            }
        }
    }
}
