use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Decision, FlowgateError, LeakyBucketMode, Limiter, Options, local::spawn_sweeper};

struct BucketState {
    // policing
    level: f64,
    last_leak: Instant,
    // shaping
    next_free: Instant,
}

/// Leaky bucket, in-process.
///
/// A reservoir drains at `leak_rate` units per second. Policing mode rejects
/// requests that would overflow it. Shaping mode instead queues them against
/// a virtual "next free slot" instant and tells the caller how long to hold
/// the request; it is the one algorithm that returns a nonzero `retry_after`
/// on an *allowed* decision.
pub(crate) struct LeakyBucket {
    capacity: i64,
    leak_rate: i64,
    mode: LeakyBucketMode,
    options: Options,
    states: Arc<DashMap<String, BucketState>>,
}

impl LeakyBucket {
    pub(crate) fn new(
        capacity: i64,
        leak_rate: i64,
        mode: LeakyBucketMode,
        options: Options,
    ) -> Self {
        let states = Arc::new(DashMap::new());

        let idle_horizon =
            Duration::from_secs((capacity as f64 / leak_rate as f64).ceil() as u64 + 1);
        spawn_sweeper(&states, move |state: &BucketState| {
            state.last_leak.elapsed() >= idle_horizon && state.next_free.elapsed() >= idle_horizon
        });

        LeakyBucket {
            capacity,
            leak_rate,
            mode,
            options,
            states,
        }
    }

    fn decide_policing(&self, state: &mut BucketState, capacity: i64, n: u32) -> Decision {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_leak).as_secs_f64();
        let leaked = elapsed * self.leak_rate as f64;
        state.level = (state.level - leaked).max(0.0);
        state.last_leak = now;

        let cost = n as f64;
        if state.level + cost <= capacity as f64 {
            state.level += cost;
            let remaining = (capacity as f64 - state.level).floor().max(0.0) as i64;
            return Decision {
                allowed: true,
                remaining,
                limit: capacity,
                reset_at: None,
                retry_after: Duration::ZERO,
            };
        }

        let retry_secs = (cost / self.leak_rate as f64).ceil();
        Decision::denied(capacity, Duration::from_secs_f64(retry_secs))
    }

    fn decide_shaping(&self, state: &mut BucketState, capacity: i64, n: u32) -> Decision {
        let now = Instant::now();
        if state.next_free < now {
            state.next_free = now;
        }

        let delay = state.next_free.duration_since(now);
        let queue_depth = delay.as_secs_f64() * self.leak_rate as f64;

        let cost = n as f64;
        if queue_depth + cost <= capacity as f64 {
            state.next_free += Duration::from_secs_f64(cost / self.leak_rate as f64);
            let remaining = (capacity as f64 - queue_depth - cost).floor().max(0.0) as i64;
            return Decision {
                allowed: true,
                remaining,
                limit: capacity,
                reset_at: None,
                // The queued delay: the caller holds the request this long.
                retry_after: delay,
            };
        }

        // No queue slot left; the caller has to back off on their own.
        Decision::denied(capacity, Duration::ZERO)
    }
}

#[async_trait]
impl Limiter for LeakyBucket {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let capacity = self.options.resolve_limit(key, self.capacity);
        let now = Instant::now();

        let mut state = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| BucketState {
                level: 0.0,
                last_leak: now,
                next_free: now,
            });

        Ok(match self.mode {
            LeakyBucketMode::Policing => self.decide_policing(&mut state, capacity, n),
            LeakyBucketMode::Shaping => self.decide_shaping(&mut state, capacity, n),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.states.remove(key);
        Ok(())
    }
}
