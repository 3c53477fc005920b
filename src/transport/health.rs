//! HTTP health probe.
//!
//! The trigger server exposes `GET /health` next to the WebSocket
//! endpoint. The probe is used to check liveness outside the socket, for
//! example before a manual reconnect or while the breaker is open.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// HealthReport
// ============================================================================

/// Parsed `/health` body.
///
/// Servers that answer with a non-JSON body get a report with status `ok`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    /// Reported status (`healthy`, `ok`, ...).
    #[serde(default = "default_status")]
    pub status: String,

    /// Service name.
    #[serde(default)]
    pub service: Option<String>,

    /// Service version.
    #[serde(default)]
    pub version: Option<String>,
}

fn default_status() -> String {
    "ok".to_string()
}

impl HealthReport {
    /// Returns `true` unless the server reported itself unhealthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !matches!(
            self.status.to_ascii_lowercase().as_str(),
            "unhealthy" | "error" | "down" | "degraded"
        )
    }
}

// ============================================================================
// HealthProbe
// ============================================================================

/// Issues `GET /health` requests.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    url: Url,
}

impl HealthProbe {
    /// Creates a probe for the given health URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// Returns the probed URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Performs one health check.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] if the request fails
    /// - [`Error::HealthCheck`] on a non-2xx status or an unhealthy report
    pub async fn check(&self) -> Result<HealthReport> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::health_check(format!("HTTP {status}")));
        }

        let body = response.text().await?;
        let report = serde_json::from_str::<HealthReport>(&body).unwrap_or_else(|_| HealthReport {
            status: default_status(),
            service: None,
            version: None,
        });

        if !report.is_healthy() {
            return Err(Error::health_check(format!("status {}", report.status)));
        }

        trace!(status = %report.status, "Health check passed");
        Ok(report)
    }

    /// Polls until the server reports healthy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] if `deadline` elapses first.
    pub async fn wait_until_healthy(
        &self,
        deadline: Duration,
        poll_interval: Duration,
    ) -> Result<HealthReport> {
        let started = Instant::now();
        loop {
            match self.check().await {
                Ok(report) => return Ok(report),
                Err(e) => debug!(error = %e, "Server not healthy yet"),
            }

            if started.elapsed() + poll_interval > deadline {
                return Err(Error::connection_timeout(deadline.as_millis() as u64));
            }
            sleep(poll_interval).await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str, body: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });

        Url::parse(&format!("http://127.0.0.1:{port}/health")).expect("url")
    }

    #[tokio::test]
    async fn test_healthy_server() {
        let url = serve_once("200 OK", r#"{"status":"healthy","service":"adw-trigger"}"#).await;
        let probe = HealthProbe::new(url, Duration::from_secs(5)).expect("client");

        let report = probe.check().await.expect("healthy");
        assert_eq!(report.status, "healthy");
        assert_eq!(report.service.as_deref(), Some("adw-trigger"));
    }

    #[tokio::test]
    async fn test_non_json_body_is_ok() {
        let url = serve_once("200 OK", "OK").await;
        let probe = HealthProbe::new(url, Duration::from_secs(5)).expect("client");

        let report = probe.check().await.expect("healthy");
        assert_eq!(report.status, "ok");
    }

    #[tokio::test]
    async fn test_unavailable_server() {
        let url = serve_once("503 Service Unavailable", r#"{"status":"down"}"#).await;
        let probe = HealthProbe::new(url, Duration::from_secs(5)).expect("client");

        let err = probe.check().await.unwrap_err();
        assert!(matches!(err, Error::HealthCheck { .. }));
    }

    #[tokio::test]
    async fn test_unhealthy_report() {
        let url = serve_once("200 OK", r#"{"status":"unhealthy"}"#).await;
        let probe = HealthProbe::new(url, Duration::from_secs(5)).expect("client");

        assert!(probe.check().await.is_err());
    }

    #[test]
    fn test_report_health_classification() {
        let report = HealthReport {
            status: "Degraded".into(),
            service: None,
            version: None,
        };
        assert!(!report.is_healthy());
    }
}
