//! The opt-in pacer: classic exponential backoff with a shared,
//! cooperative `increment`, generalizing `ExponentialCounter` from
//! `original_source/SubredditStream.py`.

use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

use crate::config::Config;
use crate::source::Quota;

use super::RateLimiter;

#[derive(Debug)]
struct State {
    current_wait: f64,
    throttle_level: f64,
    /// Cleared at the start of every [`RateLimiter::end_loop`], so the first
    /// `increment()` in a round backs off and every subsequent one in the
    /// same round is a no-op — the cooperative behavior spec.md §4.b
    /// requires so one shared pacer doesn't double-penalize a round just
    /// because several listings went empty.
    incremented: bool,
}

/// Doubles its wait on `increment()` up to `max_wait`, halves back to
/// `min_wait` on `reset()`, and additionally throttles against a measured
/// request rate once it reads a fresh [`Quota`].
#[derive(Debug)]
pub struct ExponentialPacer {
    min_wait: f64,
    max_wait: f64,
    ratelimit_exhaustion: u32,
    quota_cooldown_secs: f64,
    state: Mutex<State>,
}

impl ExponentialPacer {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            min_wait: config.min_wait_secs,
            max_wait: config.max_wait_secs,
            ratelimit_exhaustion: config.ratelimit_exhaustion,
            quota_cooldown_secs: config.quota_cooldown_secs as f64,
            state: Mutex::new(State {
                current_wait: config.min_wait_secs,
                throttle_level: 1.0,
                incremented: false,
            }),
        }
    }
}

#[async_trait::async_trait]
impl RateLimiter for ExponentialPacer {
    fn increment(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.incremented {
            return;
        }
        state.incremented = true;
        state.current_wait = (state.current_wait * 2.0).min(self.max_wait);
        tracing::debug!(current_wait = state.current_wait, "exponential pacer backing off");
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let was_backed_off = state.current_wait > self.min_wait;
        state.current_wait = self.min_wait;
        if was_backed_off {
            tracing::info!("exponential pacer usage returned to sustainable");
        }
    }

    async fn end_loop(&self, quota: Quota, _last_run_duration: Duration) {
        let (base_wait, throttle_level) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            (state.current_wait, state.throttle_level)
        };

        let jitter_bound = (base_wait / self.max_wait).max(0.0);
        let jitter = rand::thread_rng().gen_range(-jitter_bound..=jitter_bound);
        let wait = (base_wait * throttle_level + jitter).max(0.0);

        tracing::debug!(wait, throttle_level, "exponential pacer sleeping");
        tokio::time::sleep(Duration::from_secs_f64(wait)).await;

        // `original_source/SubredditStream.py`'s `_calculate_ratelimit_used`:
        // usage_rate = used / (cooldown - time_until_reset), not used / this
        // round's own sleep duration.
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let time_remaining = quota.reset_timestamp.saturating_sub(now) as f64;
        let elapsed = (self.quota_cooldown_secs - time_remaining).max(1.0);
        let measured_rate = f64::from(quota.used) / elapsed;
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if measured_rate > 1.67 && quota.remaining > 30 {
                state.throttle_level *= 1.2;
                tracing::warn!(
                    throttle_level = state.throttle_level,
                    measured_rate,
                    "request rate exceeds target, raising throttle level"
                );
            }
            state.incremented = false;
        }

        if quota.remaining < self.ratelimit_exhaustion {
            tracing::warn!(remaining = quota.remaining, "sleeping until quota reset");
            let until_reset = quota.reset_timestamp.saturating_sub(now);
            tokio::time::sleep(Duration::from_secs(until_reset)).await;
        }
    }
}
