//! The default pacer: spend up to `safety_factor` of the quota uniformly
//! across each reset window, generalizing `PerformanceCounter` from
//! `original_source/SubredditStream.py`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::config::Config;
use crate::source::Quota;

use super::RateLimiter;

/// Consumes up to `safety_factor` of the reported quota per reset window,
/// spreading requests uniformly rather than bursting.
#[derive(Debug)]
pub struct AdaptivePacer {
    safety_factor: f64,
    quota: f64,
    cooldown: f64,
    target_requests: f64,
    /// `(cooldown / quota) / safety_factor`, computed once from the
    /// configured quota — spec.md §3's `min_wait`, distinct from the
    /// config's `min_wait_secs` (which the exponential pacer uses as its
    /// starting point instead).
    min_wait: Duration,
}

impl AdaptivePacer {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let quota = f64::from(config.quota_requests).max(1.0);
        let cooldown = config.quota_cooldown_secs as f64;
        let min_wait = (cooldown / quota) / config.safety_factor;
        Self {
            safety_factor: config.safety_factor,
            quota,
            cooldown,
            target_requests: (quota * config.safety_factor).floor(),
            min_wait: Duration::from_secs_f64(min_wait.max(0.0)),
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait::async_trait]
impl RateLimiter for AdaptivePacer {
    /// No-op: the adaptive pacer reads quota fresh every round rather than
    /// accumulating backoff state between rounds.
    fn increment(&self) {}

    /// No-op, for the same reason as [`Self::increment`].
    fn reset(&self) {}

    async fn end_loop(&self, quota: Quota, last_run_duration: Duration) {
        let now = now_unix();
        let time_remaining = quota.reset_timestamp.saturating_sub(now).max(1) as f64;
        let time_elapsed = (self.cooldown - time_remaining).max(1e-9);
        let used = f64::from(quota.used);

        let mut calls_remaining = self.target_requests - used;
        if calls_remaining <= 0.0 {
            let reserve = self.quota - used;
            if reserve <= 10.0 {
                tracing::warn!(
                    remaining = quota.remaining,
                    "adaptive pacer exhausted its reserve, sleeping to reset"
                );
                tokio::time::sleep(Duration::from_secs_f64(time_remaining)).await;
                return;
            }
            calls_remaining = reserve;
        }

        let mut current_wait = (time_remaining / calls_remaining) / self.safety_factor
            + last_run_duration.as_secs_f64();

        if used / time_elapsed > calls_remaining / time_remaining {
            current_wait += last_run_duration.as_secs_f64();
        }

        let jitter = rand::thread_rng().gen_range(0.0..=(current_wait / 16.0).max(0.0));
        current_wait += jitter;

        current_wait = current_wait.clamp(self.min_wait.as_secs_f64(), time_remaining);

        tracing::debug!(
            current_wait,
            target_requests = self.target_requests,
            calls_remaining,
            used = quota.used,
            remaining = quota.remaining,
            "adaptive pacer sleeping"
        );
        tokio::time::sleep(Duration::from_secs_f64(current_wait)).await;
    }
}
