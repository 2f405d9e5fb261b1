//! Connection configuration
//!
//! Options are assembled once at process start from an optional TOML file
//! and the environment, then handed to the [`ConnectionManager`](crate::ConnectionManager).

use mongodb::options::ConnectionString;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable read for the connection string unless overridden
pub const DEFAULT_URI_ENV: &str = "MONGODB_URI";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "insightlink.toml";

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error occurred while reading config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error occurred
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// No connection string was supplied
    #[error("Missing connection URI (set {env_var})")]
    MissingUri {
        /// Environment variable that was consulted
        env_var: String,
    },

    /// The connection string could not be understood
    #[error("Invalid connection URI {uri}: {reason}")]
    InvalidUri {
        /// Redacted form of the offending URI
        uri: String,
        /// What was wrong with it
        reason: String,
    },
}

/// Top-level configuration file layout
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// `[connection]` table of the configuration file
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Connection string; the environment variable wins when both are set
    pub uri: Option<String>,
    /// Environment variable holding the connection string
    pub uri_env: String,
    /// Upper bound of concurrent sessions in the pool
    pub max_pool_size: u32,
    /// Lower bound of concurrent sessions in the pool
    pub min_pool_size: u32,
    /// Socket inactivity timeout in milliseconds, see
    /// [`ConnectionOptions::socket_timeout`]
    pub socket_timeout_ms: u64,
    /// Server selection timeout in milliseconds
    pub server_selection_timeout_ms: u64,
    /// Preferred address family
    pub address_family: AddressFamily,
    /// Whether commands may be buffered while disconnected
    pub buffer_commands: bool,
    /// TLS policy for the first attempt
    pub tls: TlsPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let defaults = ConnectionOptions::new("");
        Self {
            uri: None,
            uri_env: DEFAULT_URI_ENV.to_string(),
            max_pool_size: defaults.max_pool_size,
            min_pool_size: defaults.min_pool_size,
            socket_timeout_ms: duration_millis(defaults.socket_timeout),
            server_selection_timeout_ms: duration_millis(defaults.server_selection_timeout),
            address_family: defaults.address_family,
            buffer_commands: defaults.buffer_commands,
            tls: defaults.tls,
        }
    }
}

/// Address family preference passed to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// Let the resolver decide
    Any,
    /// IPv4 only
    #[default]
    Ipv4,
    /// IPv6 only
    Ipv6,
}

/// Transport encryption policy
///
/// `None` for either allow-invalid flag means the driver default applies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsPolicy {
    /// Whether TLS is required
    pub enabled: bool,
    /// Accept certificates that fail validation
    pub allow_invalid_certificates: Option<bool>,
    /// Accept certificates whose hostname does not match
    pub allow_invalid_hostnames: Option<bool>,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_invalid_certificates: Some(false),
            allow_invalid_hostnames: Some(false),
        }
    }
}

impl TlsPolicy {
    /// Policy used after a TLS handshake failure: encryption off, validation
    /// flags deferred to the driver
    #[must_use]
    pub const fn relaxed() -> Self {
        Self {
            enabled: false,
            allow_invalid_certificates: None,
            allow_invalid_hostnames: None,
        }
    }
}

/// Immutable set of options used for every connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Connection string
    pub uri: String,
    /// Upper bound of concurrent sessions
    pub max_pool_size: u32,
    /// Lower bound of concurrent sessions
    pub min_pool_size: u32,
    /// Socket inactivity timeout
    ///
    /// The Rust driver has no inactivity timeout; [`MongoDriver`](crate::MongoDriver)
    /// applies this value as its connect timeout instead.
    pub socket_timeout: Duration,
    /// How long the driver may look for a usable server
    pub server_selection_timeout: Duration,
    /// Preferred address family
    pub address_family: AddressFamily,
    /// Whether commands may be buffered while disconnected
    pub buffer_commands: bool,
    /// TLS policy
    pub tls: TlsPolicy,
}

impl ConnectionOptions {
    /// Options tuned for short-lived serverless workers
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            max_pool_size: 1,
            min_pool_size: 0,
            socket_timeout: Duration::from_secs(30),
            server_selection_timeout: Duration::from_secs(10),
            address_family: AddressFamily::Ipv4,
            buffer_commands: false,
            tls: TlsPolicy::default(),
        }
    }

    /// Set the pool bounds
    #[must_use]
    pub const fn with_pool_size(mut self, min: u32, max: u32) -> Self {
        self.min_pool_size = min;
        self.max_pool_size = max;
        self
    }

    /// Set the server selection timeout
    #[must_use]
    pub const fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = timeout;
        self
    }

    /// Set the TLS policy
    #[must_use]
    pub fn with_tls(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }

    /// Copy of these options with TLS switched off and both validation flags
    /// cleared; everything else is preserved
    #[must_use]
    pub fn relaxed_tls(&self) -> Self {
        Self {
            tls: TlsPolicy::relaxed(),
            ..self.clone()
        }
    }

    /// Check that the connection string is present and accepted by the
    /// driver's own parser
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri = self.uri.trim();
        if uri.is_empty() {
            return Err(ConfigError::MissingUri {
                env_var: DEFAULT_URI_ENV.to_string(),
            });
        }

        ConnectionString::parse(uri)
            .map(|_| ())
            .map_err(|e| ConfigError::InvalidUri {
                uri: redact_uri(uri),
                reason: e.to_string(),
            })
    }

    /// Connection string with the password masked
    #[must_use]
    pub fn redacted_uri(&self) -> String {
        redact_uri(&self.uri)
    }
}

/// Mask the password of a connection string so it can be logged
#[must_use]
pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let body_start = scheme_end + 3;
    let body = &uri[body_start..];
    let authority_end = body.find(['/', '?']).unwrap_or(body.len());
    let Some(at) = body[..authority_end].rfind('@') else {
        return uri.to_string();
    };
    let credentials = &body[..at];
    let user = credentials.split(':').next().unwrap_or_default();
    let masked = if credentials.contains(':') {
        format!("{user}:****")
    } else {
        user.to_string()
    };
    format!("{}{masked}{}", &uri[..body_start], &body[at..])
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise from `insightlink.toml` in the
    /// working directory when present, otherwise use defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Resolve connection options against the process environment
    pub fn connection_options(&self) -> Result<ConnectionOptions, ConfigError> {
        self.connection_options_with(|name| env::var(name).ok())
    }

    /// Resolve connection options using `lookup` for environment variables
    pub fn connection_options_with<F>(&self, lookup: F) -> Result<ConnectionOptions, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let conn = &self.connection;
        let uri = lookup(&conn.uri_env)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| conn.uri.clone())
            .ok_or_else(|| ConfigError::MissingUri {
                env_var: conn.uri_env.clone(),
            })?;

        let options = ConnectionOptions {
            uri,
            max_pool_size: conn.max_pool_size,
            min_pool_size: conn.min_pool_size,
            socket_timeout: Duration::from_millis(conn.socket_timeout_ms),
            server_selection_timeout: Duration::from_millis(conn.server_selection_timeout_ms),
            address_family: conn.address_family,
            buffer_commands: conn.buffer_commands,
            tls: conn.tls.clone(),
        };
        options.validate()?;
        Ok(options)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
