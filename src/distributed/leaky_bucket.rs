use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    Decision, FlowgateError, LeakyBucketMode, Limiter, Options,
    distributed::{AtomicScript, decision_reply, unix_now_secs_f64},
    store::Store,
};

const POLICING_LUA: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local leak_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])

local data = redis.call('HGETALL', key)
local level = 0
local last_leak = now

if #data > 0 then
  local fields = {}
  for i = 1, #data, 2 do
    fields[data[i]] = data[i + 1]
  end
  level = tonumber(fields['level']) or 0
  last_leak = tonumber(fields['last_leak']) or now
end

local elapsed = now - last_leak
level = math.max(0, level - elapsed * leak_rate)

local allowed = 0
local remaining = math.max(0, math.floor(capacity - level))
local retry_after = 0

if level + cost <= capacity then
  level = level + cost
  remaining = math.max(0, math.floor(capacity - level))
  allowed = 1
else
  retry_after = math.ceil(cost / leak_rate)
end

redis.call('HSET', key, 'level', tostring(level), 'last_leak', tostring(now))
redis.call('EXPIRE', key, math.ceil(capacity / leak_rate) + 1)

return { allowed, remaining, retry_after }
"#;

const SHAPING_LUA: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local leak_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])

local data = redis.call('HGETALL', key)
local next_free = now

if #data > 0 then
  local fields = {}
  for i = 1, #data, 2 do
    fields[data[i]] = data[i + 1]
  end
  next_free = tonumber(fields['next_free']) or now
end

if next_free < now then
  next_free = now
end

local delay = next_free - now
local queue_depth = delay * leak_rate

local allowed = 0
local remaining = math.max(0, math.floor(capacity - queue_depth))
local delay_ms = 0

if queue_depth + cost <= capacity then
  delay_ms = math.floor(delay * 1000)
  next_free = next_free + (cost / leak_rate)
  allowed = 1
  queue_depth = queue_depth + cost
  remaining = math.max(0, math.floor(capacity - queue_depth))
end

redis.call('HSET', key, 'next_free', tostring(next_free))
redis.call('EXPIRE', key, math.ceil(capacity / leak_rate) + 1)

return { allowed, remaining, delay_ms }
"#;

/// Leaky bucket over a shared store, in either policing or shaping mode.
///
/// The two modes keep different state (a draining level vs. a "next free
/// slot" instant), so each runs its own script. Shaping replies with the
/// queued delay in milliseconds on allowed decisions; policing replies with
/// a whole-second retry hint on denials.
pub(crate) struct LeakyBucket {
    store: Arc<dyn Store>,
    capacity: i64,
    leak_rate: i64,
    mode: LeakyBucketMode,
    options: Options,
    script: AtomicScript,
}

impl LeakyBucket {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        capacity: i64,
        leak_rate: i64,
        mode: LeakyBucketMode,
        options: Options,
    ) -> Self {
        let script = match mode {
            LeakyBucketMode::Policing => AtomicScript::new(POLICING_LUA),
            LeakyBucketMode::Shaping => AtomicScript::new(SHAPING_LUA),
        };

        LeakyBucket {
            store,
            capacity,
            leak_rate,
            mode,
            options,
            script,
        }
    }
}

#[async_trait]
impl Limiter for LeakyBucket {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let capacity = self.options.resolve_limit(key, self.capacity);
        let keys = [self.options.format_key(key)];
        let args = [
            capacity.to_string(),
            self.leak_rate.to_string(),
            unix_now_secs_f64().to_string(),
            n.to_string(),
        ];

        let reply = match self.script.invoke(&self.store, &keys, &args).await {
            Ok(reply) => reply,
            Err(err) => return self.options.fail_decision(capacity, err),
        };

        let (allowed, remaining, third) = decision_reply(reply)?;

        let retry_after = match self.mode {
            LeakyBucketMode::Policing if !allowed => Duration::from_secs(third.max(0) as u64),
            LeakyBucketMode::Shaping if allowed => Duration::from_millis(third.max(0) as u64),
            _ => Duration::ZERO,
        };

        Ok(Decision {
            allowed,
            remaining,
            limit: capacity,
            reset_at: None,
            retry_after,
        })
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.store.del(&[self.options.format_key(key)]).await
    }
}
