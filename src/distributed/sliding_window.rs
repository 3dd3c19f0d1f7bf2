use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    Decision, FlowgateError, Limiter, Options,
    distributed::{AtomicScript, decision_reply, unix_now_millis},
    store::Store,
};

// Eviction, the size check, the inserts, and the TTL form one
// read-decide-write sequence; running them as separate commands would let
// two processes both observe room below the limit and both insert past it.
const SLIDING_WINDOW_LUA: &str = r#"
local key = KEYS[1]
local max_requests = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])
local now_ms = tonumber(ARGV[4])
local seed = ARGV[5]

redis.call('ZREMRANGEBYSCORE', key, 0, now_ms - window_ms)
local count = redis.call('ZCARD', key)

if count + cost <= max_requests then
  for i = 1, cost do
    redis.call('ZADD', key, now_ms, now_ms .. ':' .. seed .. ':' .. i)
  end
  redis.call('PEXPIRE', key, window_ms)
  return { 1, max_requests - count - cost, 0 }
end

local retry_ms = window_ms
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if #oldest > 0 then
  local r = tonumber(oldest[2]) + window_ms - now_ms
  if r > 0 and r <= window_ms then
    retry_ms = r
  end
end
return { 0, 0, retry_ms }
"#;

/// Sliding window log over a shared store.
///
/// The log is a sorted set scored by epoch millisecond; members carry a
/// random per-call seed so several requests landing on one millisecond stay
/// distinct.
pub(crate) struct SlidingWindowLog {
    store: Arc<dyn Store>,
    max_requests: i64,
    window_seconds: i64,
    options: Options,
    script: AtomicScript,
}

impl SlidingWindowLog {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        max_requests: i64,
        window_seconds: i64,
        options: Options,
    ) -> Self {
        SlidingWindowLog {
            store,
            max_requests,
            window_seconds,
            options,
            script: AtomicScript::new(SLIDING_WINDOW_LUA),
        }
    }
}

#[async_trait]
impl Limiter for SlidingWindowLog {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let limit = self.options.resolve_limit(key, self.max_requests);
        let keys = [self.options.format_key(key)];
        let args = [
            limit.to_string(),
            (self.window_seconds * 1000).to_string(),
            n.to_string(),
            unix_now_millis().to_string(),
            rand::random::<u64>().to_string(),
        ];

        let reply = match self.script.invoke(&self.store, &keys, &args).await {
            Ok(reply) => reply,
            Err(err) => return self.options.fail_decision(limit, err),
        };

        let (allowed, remaining, retry_ms) = decision_reply(reply)?;

        Ok(Decision {
            allowed,
            remaining,
            limit,
            reset_at: None,
            retry_after: Duration::from_millis(retry_ms.max(0) as u64),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.store.del(&[self.options.format_key(key)]).await
    }
}
