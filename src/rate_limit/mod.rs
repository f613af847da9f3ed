//! The pacing interface shared by both pacer variants, and the
//! one-interface-two-strategies split `original_source/SubredditStream.py`
//! draws between `PerformanceCounter` and `ExponentialCounter`.

use std::time::Duration;

use crate::source::Quota;

pub mod adaptive;
pub mod exponential;

pub use adaptive::AdaptivePacer;
pub use exponential::ExponentialPacer;

/// Shared pacing strategy a [`crate::MultiStream`] drives exactly once per
/// round, regardless of how many listings it polled.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Signals "this round produced nothing new" for one listing. A no-op
    /// for the adaptive pacer; cooperative backoff for the exponential one.
    fn increment(&self);

    /// Signals "this round produced at least one new item" for one listing.
    fn reset(&self);

    /// The single blocking point in the main loop: computes and sleeps the
    /// round's wait, given the latest reported `quota` and how long the
    /// round itself took to run.
    async fn end_loop(&self, quota: Quota, last_run_duration: Duration);
}
