use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    Decision, FlowgateError, Limiter, Options,
    distributed::{AtomicScript, decision_reply, unix_now_secs_f64},
    store::Store,
};

const GCRA_LUA: &str = r#"
local key = KEYS[1]
local emission_interval = tonumber(ARGV[1])
local burst_allowance = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local increment = tonumber(ARGV[4])

local tat = tonumber(redis.call('GET', key)) or now
tat = math.max(tat, now)

local new_tat = tat + increment
local diff = new_tat - now

if diff <= burst_allowance + emission_interval then
  redis.call('SET', key, tostring(new_tat))
  redis.call('EXPIRE', key, math.ceil(burst_allowance + emission_interval) + 1)
  local remaining = math.floor((burst_allowance - diff + emission_interval) / emission_interval)
  return { 1, remaining, 0 }
else
  local retry_after = math.ceil(diff - burst_allowance)
  return { 0, 0, retry_after }
end
"#;

/// Generic Cell Rate Algorithm over a shared store.
///
/// The single stored value is the theoretical arrival time as fractional
/// epoch seconds; an absent key reads as "now", which is exactly a fresh
/// caller's state.
pub(crate) struct Gcra {
    store: Arc<dyn Store>,
    emission_interval: f64,
    burst: i64,
    options: Options,
    script: AtomicScript,
}

impl Gcra {
    pub(crate) fn new(store: Arc<dyn Store>, rate: i64, burst: i64, options: Options) -> Self {
        Gcra {
            store,
            emission_interval: 1.0 / rate as f64,
            burst,
            options,
            script: AtomicScript::new(GCRA_LUA),
        }
    }
}

#[async_trait]
impl Limiter for Gcra {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let burst = self.options.resolve_limit(key, self.burst);
        let burst_allowance = (burst - 1) as f64 * self.emission_interval;

        let keys = [self.options.format_key(key)];
        let args = [
            self.emission_interval.to_string(),
            burst_allowance.to_string(),
            unix_now_secs_f64().to_string(),
            (self.emission_interval * n as f64).to_string(),
        ];

        let reply = match self.script.invoke(&self.store, &keys, &args).await {
            Ok(reply) => reply,
            Err(err) => return self.options.fail_decision(burst, err),
        };

        let (allowed, remaining, retry_secs) = decision_reply(reply)?;

        Ok(Decision {
            allowed,
            remaining,
            limit: burst,
            reset_at: None,
            retry_after: Duration::from_secs(retry_secs.max(0) as u64),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.store.del(&[self.options.format_key(key)]).await
    }
}
