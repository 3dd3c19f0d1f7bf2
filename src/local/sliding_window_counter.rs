use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Decision, FlowgateError, Limiter, Options, local::spawn_sweeper};

struct CounterState {
    window_start: Instant,
    previous: i64,
    current: i64,
}

/// Sliding window counter, in-process.
///
/// The weighted two-counter approximation: the previous window's count is
/// scaled by the unelapsed fraction of the current window and added to the
/// current count. Assumes the previous window's requests were uniformly
/// spread, which keeps the error around 1% in steady state at O(1) memory.
pub(crate) struct SlidingWindowCounter {
    max_requests: i64,
    window: Duration,
    options: Options,
    states: Arc<DashMap<String, CounterState>>,
}

impl SlidingWindowCounter {
    pub(crate) fn new(max_requests: i64, window_seconds: i64, options: Options) -> Self {
        let window = Duration::from_secs(window_seconds as u64);
        let states = Arc::new(DashMap::new());

        let horizon = window * 2;
        spawn_sweeper(&states, move |state: &CounterState| {
            state.window_start.elapsed() >= horizon
        });

        SlidingWindowCounter {
            max_requests,
            window,
            options,
            states,
        }
    }
}

#[async_trait]
impl Limiter for SlidingWindowCounter {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let limit = self.options.resolve_limit(key, self.max_requests);
        let now = Instant::now();

        let mut state = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| CounterState {
                window_start: now,
                previous: 0,
                current: 0,
            });

        while now.duration_since(state.window_start) >= self.window {
            state.previous = state.current;
            state.current = 0;
            state.window_start += self.window;
        }

        let elapsed_fraction =
            now.duration_since(state.window_start).as_secs_f64() / self.window.as_secs_f64();
        let prev_weight = state.previous as f64 * (1.0 - elapsed_fraction);
        let estimate = prev_weight + state.current as f64;

        let cost = n as f64;
        if estimate + cost <= limit as f64 {
            state.current += n as i64;
            let new_estimate = prev_weight + state.current as f64;
            let remaining = (limit as f64 - new_estimate).floor().max(0.0) as i64;
            return Ok(Decision {
                allowed: true,
                remaining,
                limit,
                reset_at: None,
                retry_after: Duration::ZERO,
            });
        }

        let retry_secs = (self.window.as_secs_f64() * (1.0 - elapsed_fraction)).ceil();
        let retry_after = Duration::from_secs_f64(retry_secs).max(Duration::from_secs(1));

        Ok(Decision::denied(limit, retry_after))
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.states.remove(key);
        Ok(())
    }
}
