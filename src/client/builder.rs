//! Builder pattern for connection manager configuration.
//!
//! # Example
//!
//! ```ignore
//! use adw_trigger_client::ConnectionManager;
//!
//! let manager = ConnectionManager::builder()
//!     .url("ws://localhost:8002/ws/trigger")
//!     .max_queue_size(50)
//!     .heartbeat(false)
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::{Transport, TungsteniteTransport};

use super::liveness::{Environment, HeadlessEnvironment};
use super::manager::ConnectionManager;
use super::options::{ConnectionOptions, DEFAULT_PORT, Scheme};

// ============================================================================
// ConnectionManagerBuilder
// ============================================================================

/// Builder for a [`ConnectionManager`].
///
/// Individual setters override the matching field of a whole
/// [`ConnectionOptions`] passed via [`options`](Self::options).
#[derive(Default)]
pub struct ConnectionManagerBuilder {
    options: Option<ConnectionOptions>,
    host: Option<String>,
    port: Option<u16>,
    scheme: Option<Scheme>,
    url: Option<String>,
    auto_reconnect: Option<bool>,
    max_reconnect_attempts: Option<u32>,
    heartbeat: Option<bool>,
    message_queue: Option<bool>,
    max_queue_size: Option<usize>,
    transport: Option<Arc<dyn Transport>>,
    environment: Option<Box<dyn Environment>>,
}

// ============================================================================
// ConnectionManagerBuilder Implementation
// ============================================================================

impl ConnectionManagerBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a complete set of options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Sets the server host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the server port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[inline]
    #[must_use]
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// Sets host, port, scheme and path from a `ws://` or `wss://` URL.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = Some(enabled);
        self
    }

    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    #[inline]
    #[must_use]
    pub fn heartbeat(mut self, enabled: bool) -> Self {
        self.heartbeat = Some(enabled);
        self
    }

    #[inline]
    #[must_use]
    pub fn message_queue(mut self, enabled: bool) -> Self {
        self.message_queue = Some(enabled);
        self
    }

    #[inline]
    #[must_use]
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = Some(size);
        self
    }

    /// Replaces the default tokio-tungstenite transport.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replaces the default [`HeadlessEnvironment`].
    #[must_use]
    pub fn environment(mut self, environment: impl Environment) -> Self {
        self.environment = Some(Box::new(environment));
        self
    }

    /// Builds the manager. Does not connect.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no host or URL was given, or an option is invalid
    /// - [`Error::Url`] if the URL does not parse
    pub fn build(self) -> Result<ConnectionManager> {
        let options = self.resolve_options()?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(TungsteniteTransport::new()),
        };
        let environment: Box<dyn Environment> = match self.environment {
            Some(environment) => environment,
            None => Box::new(HeadlessEnvironment),
        };

        ConnectionManager::from_parts(options, transport, environment)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionManagerBuilder {
    fn resolve_options(&self) -> Result<ConnectionOptions> {
        let mut options = match &self.options {
            Some(options) => options.clone(),
            None if self.url.is_some() || self.host.is_some() => {
                ConnectionOptions::new(String::new(), DEFAULT_PORT)
            }
            None => {
                return Err(Error::config(
                    "Server host is required. Use .host() or .url() to set it.\n\
                     Example: ConnectionManager::builder().host(\"localhost\")",
                ));
            }
        };

        if let Some(raw) = &self.url {
            apply_url(&mut options, raw)?;
        }
        if let Some(host) = &self.host {
            options.host.clone_from(host);
        }
        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(scheme) = self.scheme {
            options.scheme = scheme;
        }
        if let Some(enabled) = self.auto_reconnect {
            options.auto_reconnect = enabled;
        }
        if let Some(attempts) = self.max_reconnect_attempts {
            options.max_reconnect_attempts = attempts;
        }
        if let Some(enabled) = self.heartbeat {
            options.heartbeat = enabled;
        }
        if let Some(enabled) = self.message_queue {
            options.message_queue_enabled = enabled;
        }
        if let Some(size) = self.max_queue_size {
            options.max_queue_size = size;
        }

        options.validate()?;
        Ok(options)
    }
}

fn apply_url(options: &mut ConnectionOptions, raw: &str) -> Result<()> {
    let url = Url::parse(raw)?;
    options.scheme = url.scheme().parse()?;
    options.host = url
        .host_str()
        .ok_or_else(|| Error::config(format!("URL has no host: {raw}")))?
        .to_string();
    options.port = url.port().unwrap_or(DEFAULT_PORT);
    if url.path() != "/" {
        options.path = url.path().to_string();
    }
    Ok(())
}

impl fmt::Debug for ConnectionManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManagerBuilder")
            .field("options", &self.options)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("url", &self.url)
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::options::DEFAULT_PATH;

    #[test]
    fn test_missing_host_is_fatal() {
        let err = ConnectionManagerBuilder::new().resolve_options().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_host_and_port() {
        let options = ConnectionManagerBuilder::new()
            .host("trigger.local")
            .port(9000)
            .resolve_options()
            .expect("options");
        assert_eq!(options.host, "trigger.local");
        assert_eq!(options.port, 9000);
        assert_eq!(options.path, DEFAULT_PATH);
    }

    #[test]
    fn test_url_sets_everything() {
        let options = ConnectionManagerBuilder::new()
            .url("wss://adw.example.com:9443/ws/custom")
            .resolve_options()
            .expect("options");
        assert_eq!(options.scheme, Scheme::Wss);
        assert_eq!(options.host, "adw.example.com");
        assert_eq!(options.port, 9443);
        assert_eq!(options.path, "/ws/custom");
    }

    #[test]
    fn test_url_default_port_and_path() {
        let options = ConnectionManagerBuilder::new()
            .url("ws://localhost")
            .resolve_options()
            .expect("options");
        assert_eq!(options.port, DEFAULT_PORT);
        assert_eq!(options.path, DEFAULT_PATH);
    }

    #[test]
    fn test_url_rejects_http() {
        assert!(
            ConnectionManagerBuilder::new()
                .url("http://localhost:8002")
                .resolve_options()
                .is_err()
        );
    }

    #[test]
    fn test_flags_override_options() {
        let base = ConnectionOptions::new("localhost", 8002);
        let options = ConnectionManagerBuilder::new()
            .options(base)
            .auto_reconnect(false)
            .heartbeat(false)
            .message_queue(false)
            .max_queue_size(5)
            .max_reconnect_attempts(2)
            .resolve_options()
            .expect("options");
        assert!(!options.auto_reconnect);
        assert!(!options.heartbeat);
        assert!(!options.message_queue_enabled);
        assert_eq!(options.max_queue_size, 5);
        assert_eq!(options.max_reconnect_attempts, 2);
    }
}
