//! Time sources and sleep capabilities used by admission windows.
//!
//! Windows never read the wall clock or sleep directly. They go through
//! [`Clock`] and [`Sleeper`], so tests can drive time by hand with
//! [`ManualClock`] (available in test builds or with the `test-helpers`
//! feature).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Suspends the caller for a given duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration` before returning.
    async fn sleep(&self, duration: Duration);
}

/// System clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-helpers"))]
mod manual {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, Utc};
    use parking_lot::Mutex;

    use super::{Clock, Sleeper};

    #[derive(Debug)]
    struct State {
        now: DateTime<Utc>,
        sleeps: Vec<Duration>,
    }

    /// Hand-driven clock that is also a [`Sleeper`].
    ///
    /// Sleeping returns immediately after advancing the clock by the
    /// requested duration, and every requested delay is recorded so tests
    /// can assert on the backoff a window chose. Clones share state.
    ///
    /// ```ignore
    /// use std::time::Duration;
    /// use chrono::{TimeZone, Utc};
    /// use tollgate::ratelimit::{Clock, ManualClock};
    ///
    /// let start = Utc.timestamp_opt(0, 0).unwrap();
    /// let clock = ManualClock::new(start);
    /// clock.advance(Duration::from_secs(10));
    /// assert_eq!(clock.now().timestamp(), 10);
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        state: Arc<Mutex<State>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `start`.
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                state: Arc::new(Mutex::new(State {
                    now: start,
                    sleeps: Vec::new(),
                })),
            }
        }

        /// Move the clock forward without recording a sleep.
        pub fn advance(&self, duration: Duration) {
            let mut state = self.state.lock();
            state.now += to_delta(duration);
        }

        /// Every duration passed to [`Sleeper::sleep`] so far, in order.
        pub fn sleeps(&self) -> Vec<Duration> {
            self.state.lock().sleeps.clone()
        }

        /// Sum of all recorded sleeps.
        pub fn total_slept(&self) -> Duration {
            self.state.lock().sleeps.iter().sum()
        }
    }

    fn to_delta(duration: Duration) -> TimeDelta {
        TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.state.lock().now
        }
    }

    #[async_trait]
    impl Sleeper for ManualClock {
        async fn sleep(&self, duration: Duration) {
            let mut state = self.state.lock();
            state.now += to_delta(duration);
            state.sleeps.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        let t2 = clock.now();

        assert!(t2 > t1);
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_and_records() {
        let start = Utc.timestamp_opt(1_000, 0).unwrap();
        let clock = ManualClock::new(start);
        let shared = clock.clone();

        shared.sleep(Duration::from_secs(3)).await;
        clock.advance(Duration::from_secs(2));
        shared.sleep(Duration::from_secs(1)).await;

        assert_eq!(clock.now().timestamp(), 1_006);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(3), Duration::from_secs(1)]
        );
        assert_eq!(clock.total_slept(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_waits() {
        let before = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(30)).await;
        assert!(before.elapsed() >= Duration::from_secs(30));
    }
}
