//! Injectable wait strategies for polling loops.

use std::time::Duration;

use rand::Rng;

/// How long to wait between attempts of a polling loop.
///
/// Every wait in the handshake takes one of these instead of a
/// hard-coded sleep, so callers (and tests running under paused tokio
/// time) control the pacing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RetryPolicy {
    /// Same interval between every attempt.
    Fixed {
        /// Interval between attempts.
        interval: Duration,
    },

    /// Interval doubles each attempt, capped at `max`.
    Exponential {
        /// Interval before the first retry.
        initial: Duration,
        /// Upper bound on the interval.
        max: Duration,
    },

    /// Wraps another policy and scales each delay by a random factor
    /// in `0.8..1.2` to avoid thundering-herd retries across nodes.
    Jittered {
        /// Base interval for the jittered schedule.
        interval: Duration,
    },
}

impl RetryPolicy {
    /// Fixed-interval policy.
    #[must_use]
    pub const fn fixed(interval: Duration) -> Self {
        Self::Fixed { interval }
    }

    /// Exponential policy starting at `initial`, capped at `max`.
    #[must_use]
    pub const fn exponential(initial: Duration, max: Duration) -> Self {
        Self::Exponential { initial, max }
    }

    /// Fixed interval with +/-20% jitter.
    #[must_use]
    pub const fn jittered(interval: Duration) -> Self {
        Self::Jittered { interval }
    }

    /// Delay to wait after the given zero-based attempt number.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { interval } => interval,
            Self::Exponential { initial, max } => {
                let exp = attempt.min(16);
                initial.saturating_mul(2u32.saturating_pow(exp)).min(max)
            }
            Self::Jittered { interval } => {
                let factor = rand::thread_rng().gen_range(0.8..1.2);
                interval.mul_f64(factor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_is_constant() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5));
        assert_eq!(policy.delay(0), Duration::from_secs(5));
        assert_eq!(policy.delay(9), Duration::from_secs(5));
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let policy =
            RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(10), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::jittered(Duration::from_secs(10));
        for attempt in 0..100 {
            let delay = policy.delay(attempt);
            assert!(delay >= Duration::from_secs(8));
            assert!(delay <= Duration::from_secs(12));
        }
    }
}
