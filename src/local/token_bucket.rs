use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Decision, FlowgateError, Limiter, Options, local::spawn_sweeper};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket, in-process.
///
/// A bucket of `capacity` tokens refills continuously at `refill_rate`
/// tokens per second; a request of cost `n` consumes `n` tokens or is denied
/// with the time the deficit takes to refill.
pub(crate) struct TokenBucket {
    capacity: i64,
    refill_rate: i64,
    options: Options,
    states: Arc<DashMap<String, BucketState>>,
}

impl TokenBucket {
    pub(crate) fn new(capacity: i64, refill_rate: i64, options: Options) -> Self {
        let states = Arc::new(DashMap::new());

        // Once a bucket has had time to refill completely, the first request
        // after idling sees the same state as a fresh key.
        let idle_horizon =
            Duration::from_secs((capacity as f64 / refill_rate as f64).ceil() as u64 + 1);
        spawn_sweeper(&states, move |state: &BucketState| {
            state.last_refill.elapsed() >= idle_horizon
        });

        TokenBucket {
            capacity,
            refill_rate,
            options,
            states,
        }
    }
}

#[async_trait]
impl Limiter for TokenBucket {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let capacity = self.options.resolve_limit(key, self.capacity);
        let now = Instant::now();

        let mut state = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| BucketState {
                tokens: capacity as f64,
                last_refill: now,
            });

        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (capacity as f64).min(state.tokens + elapsed * self.refill_rate as f64);
        state.last_refill = now;

        let cost = n as f64;
        if state.tokens >= cost {
            state.tokens -= cost;
            return Ok(Decision {
                allowed: true,
                remaining: state.tokens.floor() as i64,
                limit: capacity,
                reset_at: None,
                retry_after: Duration::ZERO,
            });
        }

        let deficit = cost - state.tokens;
        let retry_secs = (deficit / self.refill_rate as f64).ceil();
        Ok(Decision::denied(capacity, Duration::from_secs_f64(retry_secs)))
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.states.remove(key);
        Ok(())
    }
}
