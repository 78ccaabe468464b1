use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Cancelled;
use crate::Grant;
use crate::Reason;
use crate::SlidingWindow;
use crate::Strategy;
use crate::TokenBucket;
use crate::wait_for;

/// Shape of a single [`TokenBucket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    pub capacity: NonZeroUsize,
    pub increment: NonZeroUsize,
    pub interval: Duration,
}

impl BucketConfig {
    pub const fn new(capacity: NonZeroUsize, increment: NonZeroUsize, interval: Duration) -> Self {
        Self {
            capacity,
            increment,
            interval,
        }
    }

    fn build_at(&self, now: Instant) -> TokenBucket {
        TokenBucket::new_at(self.capacity, self.increment, self.interval, now)
    }
}

/// Shape of a [`SlidingWindow`]: at most `limit` grants in any `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub limit: NonZeroUsize,
    pub period: Duration,
}

impl WindowConfig {
    pub const fn new(limit: NonZeroUsize, period: Duration) -> Self {
        Self { limit, period }
    }

    fn build(&self) -> SlidingWindow {
        SlidingWindow::new(self.limit, self.period)
    }
}

/// Burst bucket and sustained window shapes for a [`CompositeLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    pub burst: BucketConfig,
    pub sustained: WindowConfig,
}

impl LimiterConfig {
    /// At most 2 calls in any second; a spent burst credit returns after 1s.
    pub const DEFAULT_BURST: BucketConfig = BucketConfig::new(
        NonZeroUsize::new(2).unwrap(),
        NonZeroUsize::MIN,
        Duration::from_secs(1),
    );

    /// At most 38 calls in any 60s; a spent slot returns 60s after its call.
    pub const DEFAULT_SUSTAINED: WindowConfig =
        WindowConfig::new(NonZeroUsize::new(38).unwrap(), Duration::from_secs(60));

    pub fn with_burst(mut self, burst: BucketConfig) -> Self {
        self.burst = burst;
        self
    }

    pub fn with_sustained(mut self, sustained: WindowConfig) -> Self {
        self.sustained = sustained;
        self
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            burst: Self::DEFAULT_BURST,
            sustained: Self::DEFAULT_SUSTAINED,
        }
    }
}

/// A short burst bucket and a sustained window acting as one limiter.
///
/// A grant needs a credit from the bucket and a slot in the window. The check
/// is all-or-nothing: when either is short, neither is spent.
#[derive(Debug, Clone)]
pub struct CompositeLimiter {
    burst: TokenBucket,
    sustained: SlidingWindow,
}

impl Strategy for CompositeLimiter {
    fn process_at(&mut self, now: Instant) -> ControlFlow<Reason> {
        self.burst.refill_at(now);
        self.sustained.expire_at(now);

        let burst_ready = self.burst.covers(1);
        let sustained_ready = self.sustained.has_room();
        if burst_ready && sustained_ready {
            self.burst.debit(1);
            self.sustained.record(now);
            return ControlFlow::Continue(());
        }

        let burst_wait = if burst_ready {
            Duration::ZERO
        } else {
            self.burst
                .time_until_available_at(1, now)
                .unwrap_or_else(|| self.burst.interval())
        };
        let retry_after = burst_wait.max(self.sustained.time_until_available_at(now));
        ControlFlow::Break(Reason::Overloaded { retry_after })
    }
}

impl CompositeLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    pub fn new_at(config: LimiterConfig, now: Instant) -> Self {
        Self {
            burst: config.burst.build_at(now),
            sustained: config.sustained.build(),
        }
    }

    pub fn burst(&self) -> &TokenBucket {
        &self.burst
    }

    pub fn sustained(&self) -> &SlidingWindow {
        &self.sustained
    }

    /// Suspends until the bucket has a credit and the window has a slot, then
    /// takes both.
    ///
    /// There is no upper bound on the wait; see [`Self::acquire_or_cancel`].
    pub async fn acquire(&mut self) -> Grant {
        let grant = wait_for(self).await;
        if grant.waits > 0 {
            debug!(
                waits = grant.waits,
                waited = ?grant.waited,
                burst = self.burst.credits(),
                sustained = self.sustained.granted(),
                "rate limit grant after waiting"
            );
        }
        grant
    }

    /// Like [`Self::acquire`], but gives up as soon as `token` is cancelled.
    ///
    /// A cancelled acquisition spends nothing.
    pub async fn acquire_or_cancel(&mut self, token: &CancellationToken) -> Result<Grant, Cancelled> {
        if token.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Cancelled),
            grant = self.acquire() => Ok(grant),
        }
    }
}

impl Default for CompositeLimiter {
    fn default() -> Self {
        Self::new(LimiterConfig::default())
    }
}
