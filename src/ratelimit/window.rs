//! Sliding-window admission control.
//!
//! A window remembers one timestamp per admitted cost unit. Before a call
//! is admitted, timestamps older than the policy interval are evicted; if
//! the remaining entries plus the new cost would exceed the window's
//! capacity, the caller is suspended and the check repeats. Windows never
//! reject a call.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tracing::{info, trace};

use super::clock::{Clock, Sleeper};
use super::rules::QuotaPolicy;

/// Fraction of the daily limit the daily window fills before backing off.
const DAILY_CAPACITY_RATIO: f64 = 0.8;
/// Wait between re-checks for the fixed-tick windows.
const TICK: Duration = Duration::from_secs(1);

/// Which budget a window enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// Total request weight
    RequestWeight,
    /// Short-interval order count
    OrderRate,
    /// Daily order count
    OrderDaily,
}

impl WindowKind {
    /// Number of live entries this window allows under `policy`.
    ///
    /// The daily window stops short of its limit, keeping the rest in
    /// reserve for its proportional backoff.
    pub fn capacity(&self, policy: &QuotaPolicy) -> u64 {
        match self {
            WindowKind::RequestWeight | WindowKind::OrderRate => policy.limit,
            WindowKind::OrderDaily => (policy.limit as f64 * DAILY_CAPACITY_RATIO).round() as u64,
        }
    }

    /// Name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::RequestWeight => "request_weight",
            WindowKind::OrderRate => "order_rate",
            WindowKind::OrderDaily => "order_daily",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-ordered queue of cost entries enforcing one [`QuotaPolicy`].
///
/// Safe to share between tasks: the queue is locked only while evicting,
/// checking and recording, never while the caller waits.
pub struct AdmissionWindow {
    kind: WindowKind,
    policy: QuotaPolicy,
    /// One timestamp per admitted cost unit, oldest at the front
    entries: Mutex<VecDeque<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for AdmissionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionWindow")
            .field("kind", &self.kind)
            .field("policy", &self.policy)
            .field("entries", &self.len())
            .finish()
    }
}

impl AdmissionWindow {
    /// Create an empty window.
    pub fn new(
        kind: WindowKind,
        policy: QuotaPolicy,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            kind,
            policy,
            entries: Mutex::new(VecDeque::new()),
            clock,
            sleeper,
        }
    }

    /// Which budget this window enforces.
    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    /// The policy this window enforces.
    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    /// Number of live entries this window allows.
    pub fn capacity(&self) -> u64 {
        self.kind.capacity(&self.policy)
    }

    /// Total recorded entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entries are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries still inside the interval as of now.
    pub fn live_entries(&self) -> usize {
        let cutoff = self.cutoff(self.clock.now());
        self.entries.lock().iter().filter(|ts| **ts >= cutoff).count()
    }

    /// Wait until `cost` units fit in the window, then record them.
    ///
    /// An empty window admits any cost straight away, so a cost larger than
    /// the capacity waits for the window to drain rather than forever.
    pub async fn admit(&self, cost: u64) {
        loop {
            let delay = {
                let mut entries = self.entries.lock();
                let now = self.clock.now();

                match self.check(&mut entries, now, cost) {
                    None => {
                        let count = usize::try_from(cost).unwrap_or(usize::MAX);
                        entries.extend(std::iter::repeat(now).take(count));
                        trace!(
                            window = %self.kind,
                            cost = cost,
                            entries = entries.len(),
                            "Admitted"
                        );
                        return;
                    }
                    Some(delay) => {
                        info!(
                            window = %self.kind,
                            entries = entries.len(),
                            capacity = self.capacity(),
                            cost = cost,
                            delay_secs = delay.as_secs(),
                            "Quota window full, delaying call"
                        );
                        delay
                    }
                }
            };

            self.sleeper.sleep(delay).await;
        }
    }

    /// Evict stale entries and decide whether `cost` fits.
    ///
    /// Returns `None` when the call may proceed, otherwise how long to wait
    /// before checking again.
    fn check(
        &self,
        entries: &mut VecDeque<DateTime<Utc>>,
        now: DateTime<Utc>,
        cost: u64,
    ) -> Option<Duration> {
        if entries.is_empty() {
            return None;
        }

        let capacity = self.capacity();
        if (entries.len() as u64).saturating_add(cost) <= capacity {
            return None;
        }

        let cutoff = self.cutoff(now);
        while entries.front().is_some_and(|ts| *ts < cutoff) {
            entries.pop_front();
        }

        if entries.is_empty() || (entries.len() as u64).saturating_add(cost) <= capacity {
            return None;
        }

        Some(self.backoff(entries, cutoff))
    }

    /// How long to wait while the window is still over capacity.
    fn backoff(&self, entries: &VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) -> Duration {
        match self.kind {
            WindowKind::RequestWeight | WindowKind::OrderRate => TICK,
            WindowKind::OrderDaily => {
                let Some(oldest) = entries.front() else {
                    return TICK;
                };
                let reserve = self.policy.limit.saturating_sub(self.capacity()).max(1);
                let remaining = (*oldest - cutoff).num_milliseconds() as f64 / 1000.0;
                let wait = (remaining / reserve as f64).round();
                if wait > 1.0 {
                    Duration::from_secs(wait as u64)
                } else {
                    TICK
                }
            }
        }
    }

    /// Entries strictly older than this are stale.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let interval = i64::try_from(self.policy.interval_secs).unwrap_or(i64::MAX);
        TimeDelta::try_seconds(interval)
            .and_then(|delta| now.checked_sub_signed(delta))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
