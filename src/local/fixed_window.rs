use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Decision, FlowgateError, Limiter, Options, local::spawn_sweeper};

struct FixedWindowState {
    window_start: Instant,
    count: i64,
}

/// Fixed window counter, in-process.
///
/// Time is cut into windows of fixed duration; each window carries an
/// independent counter that resets on rollover. Cheapest of the algorithms,
/// with the known boundary burst: a caller can spend a full limit just
/// before a boundary and another full limit just after it.
pub(crate) struct FixedWindow {
    max_requests: i64,
    window: Duration,
    options: Options,
    states: Arc<DashMap<String, FixedWindowState>>,
}

impl FixedWindow {
    pub(crate) fn new(max_requests: i64, window_seconds: i64, options: Options) -> Self {
        let window = Duration::from_secs(window_seconds as u64);
        let states = Arc::new(DashMap::new());

        // Entries are safe to drop two windows after their window opened:
        // the next request would reset the counter anyway.
        let horizon = window * 2;
        spawn_sweeper(&states, move |state: &FixedWindowState| {
            state.window_start.elapsed() >= horizon
        });

        FixedWindow {
            max_requests,
            window,
            options,
            states,
        }
    }
}

#[async_trait]
impl Limiter for FixedWindow {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let limit = self.options.resolve_limit(key, self.max_requests);
        let now = Instant::now();

        let mut state = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| FixedWindowState {
                window_start: now,
                count: 0,
            });

        if now.duration_since(state.window_start) >= self.window {
            state.window_start = now;
            state.count = 0;
        }

        let until_reset = self
            .window
            .saturating_sub(now.duration_since(state.window_start));
        let reset_at = SystemTime::now() + until_reset;

        let cost = n as i64;
        if state.count + cost <= limit {
            state.count += cost;
            return Ok(Decision {
                allowed: true,
                remaining: limit - state.count,
                limit,
                reset_at: Some(reset_at),
                retry_after: Duration::ZERO,
            });
        }

        Ok(Decision {
            allowed: false,
            remaining: 0,
            limit,
            reset_at: Some(reset_at),
            retry_after: until_reset,
        })
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.states.remove(key);
        Ok(())
    }
}
