//! Reconnection scheduling.
//!
//! Delay for attempt `n` (1-based):
//!
//! ```text
//! unjittered = min(base_delay * 2^(n-1), max_delay)
//! delay      = unjittered * uniform(0.5, 1.0)
//! ```
//!
//! Two caps apply. The lifetime cap (`max_attempts`) bounds attempts in
//! the current outage and is reset by a successful connection or a
//! network-online signal. The startup cap (`max_startup_attempts`) bounds
//! attempts made before the first connection ever succeeded.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

// ============================================================================
// ReconnectPhase
// ============================================================================

/// Which attempt cap applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconnectPhase {
    /// No connection has succeeded yet.
    Startup,
    /// At least one connection has succeeded.
    Lifetime,
}

impl fmt::Display for ReconnectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Startup => "startup",
            Self::Lifetime => "lifetime",
        })
    }
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Backoff parameters and attempt caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt, before jitter.
    pub base_delay: Duration,
    /// Upper bound of the unjittered delay.
    pub max_delay: Duration,
    /// Attempts allowed per outage.
    pub max_attempts: u32,
    /// Attempts allowed before the first successful connection.
    pub max_startup_attempts: u32,
    /// Scheduling requests closer together than this are dropped.
    pub min_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 20,
            max_startup_attempts: 3,
            min_interval: Duration::from_millis(250),
        }
    }
}

impl ReconnectPolicy {
    /// Unjittered delay for a 1-based attempt number.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Applies uniform `[0.5, 1.0]` jitter.
    #[must_use]
    pub fn jitter<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        delay.mul_f64(rng.gen_range(0.5..=1.0))
    }
}

// ============================================================================
// ReconnectDecision
// ============================================================================

/// Outcome of a scheduling request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Attempt `attempt` after `delay`.
    Schedule { attempt: u32, delay: Duration },
    /// Dropped: too close to the previous request.
    Throttled,
    /// A cap was reached; stop retrying.
    Exhausted { phase: ReconnectPhase, attempts: u32 },
}

// ============================================================================
// ReconnectScheduler
// ============================================================================

/// Attempt counters and throttling state.
#[derive(Debug, Clone)]
pub struct ReconnectScheduler {
    policy: ReconnectPolicy,
    attempts: u32,
    startup_attempts: u32,
    has_connected: bool,
    last_scheduled: Option<Instant>,
}

impl ReconnectScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            startup_attempts: 0,
            has_connected: false,
            last_scheduled: None,
        }
    }

    /// Returns the policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Attempts made in the current outage.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempts made before the first success.
    #[inline]
    #[must_use]
    pub fn startup_attempts(&self) -> u32 {
        self.startup_attempts
    }

    /// Returns `true` once any connection has succeeded.
    #[inline]
    #[must_use]
    pub fn has_connected(&self) -> bool {
        self.has_connected
    }

    /// Returns the phase whose cap currently applies.
    #[must_use]
    pub fn phase(&self) -> ReconnectPhase {
        if self.has_connected {
            ReconnectPhase::Lifetime
        } else {
            ReconnectPhase::Startup
        }
    }

    /// Decides whether and when to attempt the next reconnect.
    pub fn next<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> ReconnectDecision {
        if let Some(last) = self.last_scheduled
            && now.saturating_duration_since(last) < self.policy.min_interval
        {
            return ReconnectDecision::Throttled;
        }

        if !self.has_connected && self.startup_attempts >= self.policy.max_startup_attempts {
            return ReconnectDecision::Exhausted {
                phase: ReconnectPhase::Startup,
                attempts: self.startup_attempts,
            };
        }

        if self.attempts >= self.policy.max_attempts {
            return ReconnectDecision::Exhausted {
                phase: ReconnectPhase::Lifetime,
                attempts: self.attempts,
            };
        }

        self.attempts += 1;
        if !self.has_connected {
            self.startup_attempts += 1;
        }
        self.last_scheduled = Some(now);

        let delay = self.policy.jitter(self.policy.backoff(self.attempts), rng);
        ReconnectDecision::Schedule {
            attempt: self.attempts,
            delay,
        }
    }

    /// Records a successful connection.
    pub fn record_connected(&mut self) {
        self.has_connected = true;
        self.attempts = 0;
        self.last_scheduled = None;
    }

    /// Resets the lifetime counter (network came back).
    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
        self.last_scheduled = None;
    }

    /// Resets both counters for a manual reconnect.
    pub fn reset_for_manual(&mut self) {
        self.reset_attempts();
        self.startup_attempts = 0;
    }
}

impl Default for ReconnectScheduler {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 20,
            max_startup_attempts: 3,
            min_interval: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(5), Duration::from_secs(16));
        assert_eq!(p.backoff(6), Duration::from_secs(30));
        assert_eq!(p.backoff(60), Duration::from_secs(30));
    }

    #[test]
    fn test_startup_cap() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut s = ReconnectScheduler::new(policy());
        let mut now = Instant::now();

        for expected in 1..=3 {
            match s.next(now, &mut rng) {
                ReconnectDecision::Schedule { attempt, .. } => assert_eq!(attempt, expected),
                other => panic!("unexpected {other:?}"),
            }
            now += Duration::from_secs(1);
        }

        assert_eq!(
            s.next(now, &mut rng),
            ReconnectDecision::Exhausted {
                phase: ReconnectPhase::Startup,
                attempts: 3
            }
        );
    }

    #[test]
    fn test_lifetime_cap_after_first_success() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut s = ReconnectScheduler::new(ReconnectPolicy {
            max_attempts: 4,
            ..policy()
        });
        s.record_connected();
        let mut now = Instant::now();

        for _ in 0..4 {
            assert!(matches!(
                s.next(now, &mut rng),
                ReconnectDecision::Schedule { .. }
            ));
            now += Duration::from_secs(1);
        }
        assert_eq!(
            s.next(now, &mut rng),
            ReconnectDecision::Exhausted {
                phase: ReconnectPhase::Lifetime,
                attempts: 4
            }
        );

        s.reset_attempts();
        assert!(matches!(
            s.next(now, &mut rng),
            ReconnectDecision::Schedule { attempt: 1, .. }
        ));
    }

    #[test]
    fn test_throttles_back_to_back_requests() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut s = ReconnectScheduler::new(policy());
        let now = Instant::now();

        assert!(matches!(s.next(now, &mut rng), ReconnectDecision::Schedule { .. }));
        assert_eq!(
            s.next(now + Duration::from_millis(10), &mut rng),
            ReconnectDecision::Throttled
        );
        assert_eq!(s.attempts(), 1);
    }

    #[test]
    fn test_manual_reset_clears_startup_counter() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut s = ReconnectScheduler::new(policy());
        let mut now = Instant::now();
        for _ in 0..3 {
            s.next(now, &mut rng);
            now += Duration::from_secs(1);
        }
        assert_eq!(s.startup_attempts(), 3);

        s.reset_for_manual();
        assert_eq!(s.startup_attempts(), 0);
        assert_eq!(s.phase(), ReconnectPhase::Startup);
        assert!(matches!(s.next(now, &mut rng), ReconnectDecision::Schedule { .. }));
    }

    proptest! {
        #[test]
        fn prop_backoff_monotonic_and_bounded(a in 1u32..64) {
            let p = policy();
            prop_assert!(p.backoff(a) <= p.backoff(a + 1));
            prop_assert!(p.backoff(a) <= p.max_delay);
        }

        #[test]
        fn prop_jitter_within_half_to_full(attempt in 1u32..40, seed in any::<u64>()) {
            let p = policy();
            let mut rng = StdRng::seed_from_u64(seed);
            let base = p.backoff(attempt);
            let jittered = p.jitter(base, &mut rng);
            prop_assert!(jittered <= base);
            prop_assert!(jittered >= base.mul_f64(0.5));
        }
    }
}
