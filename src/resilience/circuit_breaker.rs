//! Circuit breaker guarding connection attempts.
//!
//! # State Transitions
//!
//! ```text
//! Closed   → Open:     failure_count reaches failure_threshold
//! Open     → HalfOpen: reset_timeout elapsed (computed lazily on check)
//! HalfOpen → Closed:   success_threshold consecutive successes
//! HalfOpen → Open:     any failure
//! ```
//!
//! While half-open exactly one attempt may be in flight at a time.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

// ============================================================================
// Constants
// ============================================================================

/// Default consecutive failures before opening.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default half-open successes before closing.
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Default cool-down before a probe is allowed.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// CircuitState
// ============================================================================

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Attempts pass through.
    Closed,
    /// Attempts fail fast.
    Open,
    /// One probe attempt at a time.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

// ============================================================================
// CircuitBreakerConfig
// ============================================================================

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures that open the circuit.
    pub failure_threshold: u32,
    /// Half-open successes that close it again.
    pub success_threshold: u32,
    /// Time the circuit stays open before allowing a probe.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

// ============================================================================
// CircuitBreaker
// ============================================================================

/// Tracks consecutive connection failures.
///
/// Time is passed in explicitly so callers and tests control the clock.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    consecutive_successes: u32,
    last_failure_time: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                success_threshold: config.success_threshold.max(1),
                reset_timeout: config.reset_timeout,
            },
            state: CircuitState::Closed,
            failure_count: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            probe_in_flight: false,
        }
    }

    /// Returns the current position without applying the lazy transition.
    #[inline]
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Returns the failure counter.
    #[inline]
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Returns the half-open success counter.
    #[inline]
    #[must_use]
    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    /// Returns when the last failure was recorded.
    #[inline]
    #[must_use]
    pub fn last_failure_time(&self) -> Option<Instant> {
        self.last_failure_time
    }

    /// Returns `true` if an attempt must be rejected now.
    ///
    /// An open circuit whose reset timeout has elapsed moves to half-open
    /// here, keeping its failure counters.
    pub fn is_open(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen => self.probe_in_flight,
            CircuitState::Open => {
                let elapsed = self
                    .last_failure_time
                    .map_or(self.config.reset_timeout, |t| now.saturating_duration_since(t));
                if elapsed >= self.config.reset_timeout {
                    debug!(failures = self.failure_count, "Circuit half-open");
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = false;
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Time until an open circuit admits a probe.
    #[must_use]
    pub fn retry_after(&self, now: Instant) -> Duration {
        match (self.state, self.last_failure_time) {
            (CircuitState::Open, Some(t)) => self
                .config
                .reset_timeout
                .saturating_sub(now.saturating_duration_since(t)),
            _ => Duration::ZERO,
        }
    }

    /// Marks the start of an attempt admitted by [`is_open`](Self::is_open).
    pub fn begin_attempt(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.probe_in_flight = true;
        }
    }

    /// Records a successful connection or round trip.
    pub fn record_success(&mut self) {
        self.probe_in_flight = false;
        if self.state != CircuitState::HalfOpen {
            return;
        }

        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        if self.consecutive_successes >= self.config.success_threshold {
            debug!("Circuit closed");
            self.reset();
        }
    }

    /// Records a failed connection attempt or abnormal close.
    pub fn record_failure(&mut self, now: Instant) {
        self.probe_in_flight = false;
        self.failure_count = self.failure_count.saturating_add(1);
        self.consecutive_successes = 0;

        let trip = match self.state {
            CircuitState::Closed => self.failure_count >= self.config.failure_threshold,
            CircuitState::HalfOpen | CircuitState::Open => true,
        };

        if trip {
            if self.state != CircuitState::Open {
                warn!(
                    failures = self.failure_count,
                    reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                    "Circuit opened"
                );
            }
            self.state = CircuitState::Open;
            self.last_failure_time = Some(now);
        }
    }

    /// Closes the circuit and zeroes all counters.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.consecutive_successes = 0;
        self.last_failure_time = None;
        self.probe_in_flight = false;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
