//! # recharge-limit
//!
//! `recharge-limit` provides the admission control used by the Recharge client:
//! a refillable [`TokenBucket`], an exact [`SlidingWindow`], and a
//! [`CompositeLimiter`] that pairs a short burst bucket with a sustained window.
//!
//! ## Core Philosophy
//!
//! Limiter state is owned by exactly one driver (the client's dispatcher), so
//! strategies take `&mut self` and need no locks or atomics. Every decision is
//! made lazily at the moment of the request from the elapsed time, so there are
//! no background refill timers.
//!
//! ## Key Concepts
//!
//! * **Lazy Refill**: Credits are recalculated from elapsed time on each call.
//! * **All-or-Nothing**: A composite grant spends a burst credit and a window
//!   slot, or neither.
//! * **Strategy Trait**: A unified, non-blocking interface; [`wait_for`] turns
//!   it into a suspending acquisition with a single scheduled wake-up per miss.
//!
//! ## Example
//!
//! ```rust
//! use recharge_limit::Strategy;
//! use recharge_limit::TokenBucket;
//! use std::num::NonZeroUsize;
//! use std::time::Duration;
//!
//! let capacity = NonZeroUsize::new(2).unwrap();
//! let increment = NonZeroUsize::new(1).unwrap();
//! let mut bucket = TokenBucket::new(capacity, increment, Duration::from_secs(1));
//!
//! if bucket.process().is_continue() {
//!     // Request allowed
//! }
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::Instant;
use tokio::time::sleep;
use tracing::trace;

mod composite;
mod sliding_window;
mod token_bucket;

pub use composite::BucketConfig;
pub use composite::CompositeLimiter;
pub use composite::LimiterConfig;
pub use composite::WindowConfig;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

/// Reasons why a request might be rejected by a strategy.
#[derive(Debug, PartialEq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}

/// The core trait for all rate-limiting algorithms.
pub trait Strategy: Debug {
    /// Attempts to admit a single request at `now`.
    ///
    /// This method never blocks. On rejection the returned [`Reason`] carries
    /// the minimum wait before a retry can succeed.
    fn process_at(&mut self, now: Instant) -> ControlFlow<Reason>;

    /// Attempts to admit a single request at the current instant.
    fn process(&mut self) -> ControlFlow<Reason> {
        self.process_at(Instant::now())
    }
}

/// The outcome of a successful, possibly delayed, acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Grant {
    /// How many times the caller was suspended before the grant.
    pub waits: u32,
    /// Total time spent suspended.
    pub waited: Duration,
}

/// Acquisition was abandoned because its cancellation token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("acquisition cancelled before a grant was issued")]
pub struct Cancelled;

/// Drives `strategy` until it admits a request.
///
/// Each rejection schedules exactly one sleep of the advertised `retry_after`;
/// there is no polling in between.
pub async fn wait_for<S>(strategy: &mut S) -> Grant
where
    S: Strategy + ?Sized,
{
    let mut grant = Grant::default();
    loop {
        match strategy.process() {
            ControlFlow::Continue(()) => return grant,
            ControlFlow::Break(Reason::Overloaded { retry_after }) => {
                trace!(?retry_after, waits = grant.waits, "rate limited, sleeping");
                grant.waits += 1;
                grant.waited += retry_after;
                sleep(retry_after).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_a_displayable_error() {
        let err: Box<dyn std::error::Error> = Box::new(Cancelled);
        assert_eq!(err.to_string(), "acquisition cancelled before a grant was issued");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_sleeps_once_per_refusal() {
        let mut window = SlidingWindow::new(
            std::num::NonZeroUsize::new(1).unwrap(),
            Duration::from_secs(5),
        );
        let start = Instant::now();

        assert_eq!(wait_for(&mut window).await, Grant::default());
        let grant = wait_for(&mut window).await;
        assert_eq!(grant.waits, 1);
        assert_eq!(grant.waited, Duration::from_secs(5));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }
}
