//! Connection configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use adw_trigger_client::ConnectionOptions;
//!
//! let options = ConnectionOptions::new("localhost", 8002)
//!     .with_max_reconnect_attempts(10)
//!     .with_heartbeat_interval(Duration::from_secs(10))
//!     .with_max_queue_size(50);
//!
//! assert_eq!(options.socket_url()?.as_str(), "ws://localhost:8002/ws/trigger");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::resilience::{CircuitBreakerConfig, ReconnectPolicy};

// ============================================================================
// Constants
// ============================================================================

/// Default trigger server port.
pub const DEFAULT_PORT: u16 = 8002;

/// WebSocket endpoint path.
pub const DEFAULT_PATH: &str = "/ws/trigger";

/// Health endpoint path.
pub const HEALTH_PATH: &str = "/health";

/// Environment variable holding the server host.
pub const ENV_HOST: &str = "ADW_WS_HOST";

/// Environment variable holding the server port.
pub const ENV_PORT: &str = "ADW_WS_PORT";

/// Environment variable holding `ws` or `wss`.
pub const ENV_PROTOCOL: &str = "ADW_WS_PROTOCOL";

// ============================================================================
// Scheme
// ============================================================================

/// WebSocket URL scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scheme {
    /// Plain `ws://`.
    #[default]
    Ws,
    /// TLS `wss://`.
    Wss,
}

impl Scheme {
    /// Returns the WebSocket scheme.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }

    /// Returns the matching HTTP scheme for the health endpoint.
    #[inline]
    #[must_use]
    pub const fn http_scheme(&self) -> &'static str {
        match self {
            Self::Ws => "http",
            Self::Wss => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ws" => Ok(Self::Ws),
            "wss" => Ok(Self::Wss),
            other => Err(Error::config(format!("unsupported protocol: {other}"))),
        }
    }
}

// ============================================================================
// ConnectionOptions
// ============================================================================

/// All connection manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Server host. Mandatory.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// `ws` or `wss`.
    pub scheme: Scheme,
    /// WebSocket path.
    pub path: String,

    /// Reconnect after abnormal closes.
    pub auto_reconnect: bool,
    /// Reconnect attempts per outage.
    pub max_reconnect_attempts: u32,
    /// Reconnect attempts before the first successful connection.
    pub max_startup_attempts: u32,
    /// First backoff delay before jitter.
    pub reconnect_base_delay: Duration,
    /// Backoff ceiling before jitter.
    pub max_reconnect_delay: Duration,
    /// Minimum spacing of reconnect scheduling requests.
    pub min_reconnect_interval: Duration,

    /// Send keep-alive pings while connected and visible.
    pub heartbeat: bool,
    /// Ping period.
    pub heartbeat_interval: Duration,
    /// Unanswered-ping window before the link is considered dead.
    pub heartbeat_timeout: Duration,

    /// Buffer messages while not connected.
    pub message_queue_enabled: bool,
    /// Queue capacity; oldest entries are evicted beyond it.
    pub max_queue_size: usize,
    /// Replay failures tolerated per queued message.
    pub max_message_retries: u32,

    /// Deadline of a correlated request.
    pub request_timeout: Duration,
    /// Disconnect resends tolerated per correlated request.
    pub max_request_resends: u32,
    /// Outstanding correlated requests allowed.
    pub max_pending_requests: usize,

    /// Deadline of a single transport open.
    pub connect_timeout: Duration,
    /// Flush window given to queued messages on `disconnect()`.
    pub drain_timeout: Duration,
    /// Deadline of a `/health` request.
    pub health_timeout: Duration,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options for `host:port` with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let reconnect = ReconnectPolicy::default();
        Self {
            host: host.into(),
            port,
            scheme: Scheme::Ws,
            path: DEFAULT_PATH.to_string(),
            auto_reconnect: true,
            max_reconnect_attempts: reconnect.max_attempts,
            max_startup_attempts: reconnect.max_startup_attempts,
            reconnect_base_delay: reconnect.base_delay,
            max_reconnect_delay: reconnect.max_delay,
            min_reconnect_interval: reconnect.min_interval,
            heartbeat: true,
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(30),
            message_queue_enabled: true,
            max_queue_size: 100,
            max_message_retries: 3,
            request_timeout: Duration::from_secs(30),
            max_request_resends: 3,
            max_pending_requests: 100,
            connect_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(1),
            health_timeout: Duration::from_secs(5),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    /// Reads host, port and protocol from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `ADW_WS_HOST` is unset or a value is
    /// malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup(ENV_HOST)
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::config(format!("{ENV_HOST} is not set")))?;

        let port = match lookup(ENV_PORT) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("invalid {ENV_PORT}: {raw}")))?,
            None => DEFAULT_PORT,
        };

        let mut options = Self::new(host.trim(), port);
        if let Some(raw) = lookup(ENV_PROTOCOL) {
            options.scheme = raw.parse()?;
        }
        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the URL scheme.
    #[inline]
    #[must_use]
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets the WebSocket path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the per-outage reconnect cap.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the startup reconnect cap.
    #[inline]
    #[must_use]
    pub fn with_max_startup_attempts(mut self, attempts: u32) -> Self {
        self.max_startup_attempts = attempts;
        self
    }

    /// Sets base and maximum backoff delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_delay = base;
        self.max_reconnect_delay = max;
        self
    }

    /// Enables or disables the heartbeat.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, enabled: bool) -> Self {
        self.heartbeat = enabled;
        self
    }

    /// Sets the ping period.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the unanswered-ping window.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Enables or disables the message queue.
    #[inline]
    #[must_use]
    pub fn with_message_queue(mut self, enabled: bool) -> Self {
        self.message_queue_enabled = enabled;
        self
    }

    /// Sets the queue capacity.
    #[inline]
    #[must_use]
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the correlated request deadline.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the transport open deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the disconnect flush window.
    #[inline]
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Sets the circuit breaker thresholds.
    #[inline]
    #[must_use]
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }
}

// ============================================================================
// Derived Values
// ============================================================================

impl ConnectionOptions {
    /// Checks the options for values the manager cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending option.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("missing server host"));
        }
        if self.heartbeat && self.heartbeat_interval.is_zero() {
            return Err(Error::config("heartbeat_interval must be positive"));
        }
        if self.reconnect_base_delay > self.max_reconnect_delay {
            return Err(Error::config(
                "reconnect_base_delay exceeds max_reconnect_delay",
            ));
        }
        if self.circuit_breaker.failure_threshold == 0
            || self.circuit_breaker.success_threshold == 0
        {
            return Err(Error::config("circuit breaker thresholds must be positive"));
        }
        Ok(())
    }

    /// WebSocket endpoint: `ws(s)://host:port/ws/trigger`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the host does not form a valid URL.
    pub fn socket_url(&self) -> Result<Url> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Ok(Url::parse(&format!(
            "{}://{}:{}{}",
            self.scheme, self.host, self.port, path
        ))?)
    }

    /// Health endpoint: `http(s)://host:port/health`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the host does not form a valid URL.
    pub fn health_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}://{}:{}{}",
            self.scheme.http_scheme(),
            self.host,
            self.port,
            HEALTH_PATH
        ))?)
    }

    /// Reconnect policy derived from these options.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: self.reconnect_base_delay,
            max_delay: self.max_reconnect_delay,
            max_attempts: self.max_reconnect_attempts,
            max_startup_attempts: self.max_startup_attempts,
            min_interval: self.min_reconnect_interval,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: FxHashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::new("localhost", DEFAULT_PORT);
        assert!(options.auto_reconnect);
        assert_eq!(options.max_reconnect_attempts, 20);
        assert_eq!(options.max_startup_attempts, 3);
        assert_eq!(options.max_queue_size, 100);
        assert_eq!(options.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(options.circuit_breaker.failure_threshold, 5);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_urls() {
        let options = ConnectionOptions::new("localhost", 8002);
        assert_eq!(
            options.socket_url().expect("url").as_str(),
            "ws://localhost:8002/ws/trigger"
        );
        assert_eq!(
            options.health_url().expect("url").as_str(),
            "http://localhost:8002/health"
        );

        let secure = options.with_scheme(Scheme::Wss).with_path("custom");
        assert_eq!(
            secure.socket_url().expect("url").as_str(),
            "wss://localhost:8002/custom"
        );
        assert_eq!(
            secure.health_url().expect("url").as_str(),
            "https://localhost:8002/health"
        );
    }

    #[test]
    fn test_missing_host_is_config_error() {
        let err = ConnectionOptions::new("  ", 8002).validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let options = ConnectionOptions::new("localhost", 8002)
            .with_reconnect_delay(Duration::from_secs(60), Duration::from_secs(30));
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let options = ConnectionOptions::from_lookup(lookup_from(&[
            (ENV_HOST, "trigger.internal"),
            (ENV_PORT, "9100"),
            (ENV_PROTOCOL, "WSS"),
        ]))
        .expect("valid env");
        assert_eq!(options.host, "trigger.internal");
        assert_eq!(options.port, 9100);
        assert_eq!(options.scheme, Scheme::Wss);
    }

    #[test]
    fn test_from_lookup_requires_host() {
        let err = ConnectionOptions::from_lookup(lookup_from(&[(ENV_PORT, "9100")])).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ConnectionOptions::from_lookup(lookup_from(&[
            (ENV_HOST, "localhost"),
            (ENV_PORT, "not-a-port"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
    }

    #[test]
    fn test_scheme_parse() {
        assert_eq!("ws".parse::<Scheme>().expect("ws"), Scheme::Ws);
        assert!("http".parse::<Scheme>().is_err());
    }
}
