use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::Instant;

use super::Reason;
use super::Strategy;

/// A sliding log of grants over a fixed period.
///
/// At most `limit` grants fall inside any window of length `period`: a grant
/// made at `t` only frees its slot at `t + period`. Only the last `limit`
/// grant times are kept.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    limit: usize,
    period: Duration,
    grants: VecDeque<Instant>,
}

impl Strategy for SlidingWindow {
    fn process_at(&mut self, now: Instant) -> ControlFlow<Reason> {
        if self.try_acquire_at(now) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(Reason::Overloaded {
                retry_after: self.time_until_available_at(now),
            })
        }
    }
}

impl SlidingWindow {
    pub fn new(limit: NonZeroUsize, period: Duration) -> Self {
        Self {
            limit: limit.get(),
            period,
            grants: VecDeque::with_capacity(limit.get()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Grants still counted against the window, as of the last expiry.
    pub fn granted(&self) -> usize {
        self.grants.len()
    }

    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.expire_at(now);
        if self.has_room() {
            self.record(now);
            true
        } else {
            false
        }
    }

    /// The wait until the oldest counted grant leaves the window ending at `now`.
    pub fn time_until_available_at(&self, now: Instant) -> Duration {
        if self.grants.len() < self.limit {
            return Duration::ZERO;
        }
        let oldest = self.grants[self.grants.len() - self.limit];
        (oldest + self.period).saturating_duration_since(now)
    }

    /// Drops grants made a full period or more before `now`.
    pub(crate) fn expire_at(&mut self, now: Instant) {
        while let Some(&oldest) = self.grants.front() {
            if now.saturating_duration_since(oldest) < self.period {
                break;
            }
            self.grants.pop_front();
        }
    }

    pub(crate) fn has_room(&self) -> bool {
        self.grants.len() < self.limit
    }

    pub(crate) fn record(&mut self, now: Instant) {
        self.grants.push_back(now);
    }
}
