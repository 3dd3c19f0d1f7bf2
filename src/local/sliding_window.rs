use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Decision, FlowgateError, Limiter, Options, local::spawn_sweeper};

/// Sliding window log, in-process.
///
/// Keeps one timestamp per accepted request and counts only those younger
/// than the window, so enforcement is exact. Memory is linear in the
/// per-window request count; high-throughput keys should use the counter
/// approximation instead.
pub(crate) struct SlidingWindowLog {
    max_requests: i64,
    window: Duration,
    options: Options,
    states: Arc<DashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLog {
    pub(crate) fn new(max_requests: i64, window_seconds: i64, options: Options) -> Self {
        let window = Duration::from_secs(window_seconds as u64);
        let states = Arc::new(DashMap::new());

        spawn_sweeper(&states, move |timestamps: &VecDeque<Instant>| {
            match timestamps.back() {
                None => true,
                Some(newest) => newest.elapsed() > window,
            }
        });

        SlidingWindowLog {
            max_requests,
            window,
            options,
            states,
        }
    }
}

#[async_trait]
impl Limiter for SlidingWindowLog {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let limit = self.options.resolve_limit(key, self.max_requests);
        let now = Instant::now();

        let mut timestamps = self.states.entry(key.to_string()).or_default();

        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        let count = timestamps.len() as i64;
        let cost = n as i64;

        if count + cost <= limit {
            for _ in 0..n {
                timestamps.push_back(now);
            }
            return Ok(Decision {
                allowed: true,
                remaining: limit - count - cost,
                limit,
                reset_at: None,
                retry_after: Duration::ZERO,
            });
        }

        let retry_after = match timestamps.front() {
            Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        };

        Ok(Decision::denied(limit, retry_after))
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.states.remove(key);
        Ok(())
    }
}
