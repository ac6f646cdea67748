//! Back-off configuration for the server accept loop.

use std::time::Duration;

/// Configuration for exponential back-off timing in the accept loop.
///
/// Controls retry behaviour when `accept()` fails on the server's listener. The
/// delay starts at `initial_delay`, doubles after each consecutive failure and
/// is capped at `max_delay`. A successful accept resets it.
///
/// # Default Values
/// - `initial_delay`: 10 milliseconds
/// - `max_delay`: 1 second
///
/// # Invariants
/// - `initial_delay` must not exceed `max_delay`
/// - `initial_delay` must be at least 1 millisecond
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay used for the first retry after an `accept()` failure.
    pub initial_delay: Duration,
    /// Maximum back-off delay once retries have increased exponentially.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Clamp delays to at least 1 ms and ensure `initial_delay <= max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use framelink::server::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::from_millis(1),
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay to use after a failure that waited `current`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(5, 1_000, 5, 1_000)]
    #[case(0, 0, 1, 1)]
    #[case(20, 10, 10, 20)]
    fn normalized_orders_and_floors_delays(
        #[case] initial_ms: u64,
        #[case] max_ms: u64,
        #[case] want_initial_ms: u64,
        #[case] want_max_ms: u64,
    ) {
        let cfg = BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
        }
        .normalized();
        assert_eq!(cfg.initial_delay, Duration::from_millis(want_initial_ms));
        assert_eq!(cfg.max_delay, Duration::from_millis(want_max_ms));
    }

    #[test]
    fn delay_doubles_up_to_cap() {
        let cfg = BackoffConfig::default();
        let delays: Vec<_> = std::iter::successors(Some(cfg.initial_delay), |d| {
            let next = cfg.next_delay(*d);
            (next != *d).then_some(next)
        })
        .collect();
        assert_eq!(delays.first(), Some(&Duration::from_millis(10)));
        assert_eq!(delays.last(), Some(&Duration::from_secs(1)));
        assert!(delays.windows(2).all(|w| w[1] <= w[0] * 2));
    }
}
