use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::Instant;

use super::Reason;
use super::Strategy;

/// A refillable credit pool for one rate window.
///
/// The bucket holds at most `capacity` credits and regains `increment` credits
/// every `interval`, accrued continuously. Credits are stored in exact integer
/// sub-credit units (one credit is `interval` nanoseconds' worth) so partial
/// refills never drift.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u64,
    increment: u64,
    interval_ns: u64,
    level: u128,
    last: Instant,
}

impl Strategy for TokenBucket {
    fn process_at(&mut self, now: Instant) -> ControlFlow<Reason> {
        if self.try_withdraw_at(1, now) {
            ControlFlow::Continue(())
        } else {
            let retry_after = self
                .time_until_available_at(1, now)
                .unwrap_or_else(|| self.interval());
            ControlFlow::Break(Reason::Overloaded { retry_after })
        }
    }
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The maximum number of credits the bucket can hold.
    /// * `increment` - Credits regained per `interval`.
    /// * `interval` - The refill period for `increment` credits.
    pub fn new(capacity: NonZeroUsize, increment: NonZeroUsize, interval: Duration) -> Self {
        Self::new_at(capacity, increment, interval, Instant::now())
    }

    /// Creates a full bucket whose refill clock starts at `now`.
    pub fn new_at(
        capacity: NonZeroUsize,
        increment: NonZeroUsize,
        interval: Duration,
        now: Instant,
    ) -> Self {
        let interval_ns = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX).max(1);
        let capacity = capacity.get() as u64;
        Self {
            capacity,
            increment: increment.get() as u64,
            interval_ns,
            level: capacity as u128 * interval_ns as u128,
            last: now,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_ns)
    }

    /// The credits held as of the last refill, including any fraction.
    pub fn credits(&self) -> f64 {
        self.level as f64 / self.interval_ns as f64
    }

    /// Refills, then withdraws `n` credits if they are all present.
    ///
    /// Refill bookkeeping always happens; the withdrawal is conditional and a
    /// refused withdrawal leaves the credits untouched.
    pub fn try_withdraw(&mut self, n: usize) -> bool {
        self.try_withdraw_at(n, Instant::now())
    }

    pub fn try_withdraw_at(&mut self, n: usize, now: Instant) -> bool {
        self.refill_at(now);
        if self.covers(n) {
            self.debit(n);
            true
        } else {
            false
        }
    }

    /// The minimum additional wait before `n` credits will exist.
    ///
    /// Returns `None` when `n` exceeds the capacity and can never be satisfied.
    pub fn time_until_available(&self, n: usize) -> Option<Duration> {
        self.time_until_available_at(n, Instant::now())
    }

    pub fn time_until_available_at(&self, n: usize, now: Instant) -> Option<Duration> {
        if n as u64 > self.capacity {
            return None;
        }
        let needed = self.units(n);
        let projected = self.projected_level(now);
        if projected >= needed {
            return Some(Duration::ZERO);
        }
        let deficit = needed - projected;
        let increment = self.increment as u128;
        let wait_ns = deficit.div_ceil(increment);
        Some(Duration::from_nanos(
            u64::try_from(wait_ns).unwrap_or(u64::MAX),
        ))
    }

    /// Credits `elapsed × rate` since the last refill, capped at capacity.
    pub(crate) fn refill_at(&mut self, now: Instant) {
        let level = self.projected_level(now);
        if now > self.last {
            self.level = level;
            self.last = now;
        }
    }

    #[cfg(test)]
    pub(crate) fn level(&self) -> u128 {
        self.level
    }

    pub(crate) fn covers(&self, n: usize) -> bool {
        self.level >= self.units(n)
    }

    pub(crate) fn debit(&mut self, n: usize) {
        self.level = self.level.saturating_sub(self.units(n));
    }

    fn units(&self, n: usize) -> u128 {
        n as u128 * self.interval_ns as u128
    }

    fn projected_level(&self, now: Instant) -> u128 {
        let elapsed = now.saturating_duration_since(self.last).as_nanos();
        let added = elapsed.saturating_mul(self.increment as u128);
        self.level
            .saturating_add(added)
            .min(self.units(self.capacity as usize))
    }
}
