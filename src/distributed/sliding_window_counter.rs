use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    Decision, FlowgateError, Limiter, Options,
    distributed::{AtomicScript, decision_reply, unix_now_secs},
    store::Store,
};

// Both window-index keys are read and the current one written in a single
// script. On a partitioned backend the two keys must co-locate, which is
// what hash-tag key formatting is for.
const SLIDING_WINDOW_COUNTER_LUA: &str = r#"
local current_key = KEYS[1]
local previous_key = KEYS[2]
local max_requests = tonumber(ARGV[1])
local window_seconds = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])
local now = tonumber(ARGV[4])

local elapsed = (now % window_seconds) / window_seconds
local previous = tonumber(redis.call('GET', previous_key)) or 0
local current = tonumber(redis.call('GET', current_key)) or 0
local weighted = previous * (1 - elapsed)

if weighted + current + cost > max_requests then
  local retry = math.ceil(window_seconds * (1 - elapsed))
  if retry < 1 then
    retry = 1
  end
  if retry > window_seconds then
    retry = window_seconds
  end
  return { 0, 0, retry }
end

local new_count = redis.call('INCRBY', current_key, cost)
if new_count == cost then
  redis.call('EXPIRE', current_key, window_seconds * 2)
end

local remaining = math.floor(max_requests - (weighted + new_count))
if remaining < 0 then
  remaining = 0
end
return { 1, remaining, 0 }
"#;

/// Sliding window counter over a shared store.
///
/// Two counter keys per caller, suffixed with the absolute window index; the
/// previous window's counter expires on its own two windows after it stops
/// being written.
pub(crate) struct SlidingWindowCounter {
    store: Arc<dyn Store>,
    max_requests: i64,
    window_seconds: i64,
    options: Options,
    script: AtomicScript,
}

impl SlidingWindowCounter {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        max_requests: i64,
        window_seconds: i64,
        options: Options,
    ) -> Self {
        SlidingWindowCounter {
            store,
            max_requests,
            window_seconds,
            options,
            script: AtomicScript::new(SLIDING_WINDOW_COUNTER_LUA),
        }
    }

    fn window_keys(&self, key: &str, now_secs: i64) -> [String; 2] {
        let current = now_secs / self.window_seconds;
        [
            self.options.format_key_suffix(key, current),
            self.options.format_key_suffix(key, current - 1),
        ]
    }
}

#[async_trait]
impl Limiter for SlidingWindowCounter {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let limit = self.options.resolve_limit(key, self.max_requests);
        let now_secs = unix_now_secs();
        let keys = self.window_keys(key, now_secs);
        let args = [
            limit.to_string(),
            self.window_seconds.to_string(),
            n.to_string(),
            now_secs.to_string(),
        ];

        let reply = match self.script.invoke(&self.store, &keys, &args).await {
            Ok(reply) => reply,
            Err(err) => return self.options.fail_decision(limit, err),
        };

        let (allowed, remaining, retry_secs) = decision_reply(reply)?;

        Ok(Decision {
            allowed,
            remaining,
            limit,
            reset_at: None,
            retry_after: Duration::from_secs(retry_secs.max(0) as u64),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        let keys = self.window_keys(key, unix_now_secs());
        self.store.del(&keys).await
    }
}
