//! Overall-budget bookkeeping for nested polling loops.

use std::time::Duration;

use tokio::time::Instant;

/// A fixed point in time by which an operation must have finished.
///
/// Built on `tokio::time::Instant` so tests under paused time see the
/// same clock the sleeps use. Sub-loops carve their waits out of one
/// shared deadline; overshoot is bounded by a single poll interval
/// because [`Self::sleep_capped`] never sleeps past the deadline.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    start: Instant,
    end: Instant,
}

impl Deadline {
    /// Deadline `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        let start = Instant::now();
        Self {
            start,
            end: start + budget,
        }
    }

    /// Time left before expiry, `None` once expired.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        (now < self.end).then(|| self.end - now)
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.remaining().is_none()
    }

    /// Time elapsed since the deadline was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Sleeps for `interval`, capped to the remaining budget.
    ///
    /// Returns `false` if the deadline was already expired (no sleep
    /// performed), so polling loops can use it as their continuation
    /// condition.
    pub async fn sleep_capped(&self, interval: Duration) -> bool {
        match self.remaining() {
            None => false,
            Some(remaining) => {
                tokio::time::sleep(interval.min(remaining)).await;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn remaining_counts_down() {
        let deadline = Deadline::after(Duration::from_secs(10));
        assert!(!deadline.expired());

        tokio::time::sleep(Duration::from_secs(4)).await;
        let remaining = deadline.remaining().unwrap();
        assert_eq!(remaining, Duration::from_secs(6));

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(deadline.expired());
        assert_eq!(deadline.elapsed(), Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_capped_to_budget() {
        let deadline = Deadline::after(Duration::from_secs(3));

        // Asking for 10s only sleeps the remaining 3s.
        assert!(deadline.sleep_capped(Duration::from_secs(10)).await);
        assert_eq!(deadline.elapsed(), Duration::from_secs(3));

        assert!(!deadline.sleep_capped(Duration::from_secs(1)).await);
    }
}
