use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Decision, FlowgateError, Limiter, Options, local::spawn_sweeper};

struct GcraState {
    /// Theoretical arrival time, in seconds since the engine's epoch.
    tat: f64,
}

/// Generic Cell Rate Algorithm, in-process.
///
/// One instant of state per key: the theoretical arrival time. A request is
/// admitted while the new TAT would not run further than the burst allowance
/// ahead of now, which enforces `rate` per second sustained with `burst`
/// requests of headroom, without any window bookkeeping.
pub(crate) struct Gcra {
    emission_interval: f64,
    burst: i64,
    options: Options,
    epoch: Instant,
    states: Arc<DashMap<String, GcraState>>,
}

impl Gcra {
    pub(crate) fn new(rate: i64, burst: i64, options: Options) -> Self {
        let emission_interval = 1.0 / rate as f64;
        let burst_allowance = (burst - 1) as f64 * emission_interval;
        let epoch = Instant::now();
        let states = Arc::new(DashMap::new());

        let horizon = burst_allowance + emission_interval + 1.0;
        spawn_sweeper(&states, move |state: &GcraState| {
            state.tat + horizon < epoch.elapsed().as_secs_f64()
        });

        Gcra {
            emission_interval,
            burst,
            options,
            epoch,
            states,
        }
    }
}

#[async_trait]
impl Limiter for Gcra {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let burst = self.options.resolve_limit(key, self.burst);
        let burst_allowance = (burst - 1) as f64 * self.emission_interval;

        let now = self.epoch.elapsed().as_secs_f64();
        let mut state = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| GcraState { tat: 0.0 });

        let tat = state.tat.max(now);
        let new_tat = tat + self.emission_interval * n as f64;
        let diff = new_tat - now;

        if diff <= burst_allowance + self.emission_interval {
            state.tat = new_tat;
            let remaining = ((burst_allowance - diff + self.emission_interval)
                / self.emission_interval)
                .floor() as i64;
            return Ok(Decision {
                allowed: true,
                remaining,
                limit: burst,
                reset_at: None,
                retry_after: Duration::ZERO,
            });
        }

        let retry_secs = (diff - burst_allowance).ceil();
        Ok(Decision::denied(burst, Duration::from_secs_f64(retry_secs)))
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.states.remove(key);
        Ok(())
    }
}
