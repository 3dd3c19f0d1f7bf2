use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;

use crate::{
    Decision, FlowgateError, Limiter, Options,
    distributed::{AtomicScript, decision_reply},
    store::Store,
};

const FIXED_WINDOW_LUA: &str = r#"
local key = KEYS[1]
local max_requests = tonumber(ARGV[1])
local window_seconds = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])

local count = tonumber(redis.call('GET', key)) or 0

if count + cost <= max_requests then
  local new_count = redis.call('INCRBY', key, cost)
  if count == 0 then
    redis.call('EXPIRE', key, window_seconds)
  end
  local ttl = redis.call('TTL', key)
  return { 1, max_requests - new_count, ttl }
end

local ttl = redis.call('TTL', key)
if ttl < 0 then
  ttl = window_seconds
end
return { 0, 0, ttl }
"#;

/// Fixed window counter over a shared store.
///
/// One counter key per caller; the key's TTL doubles as the window boundary,
/// so the script's TTL reading becomes both `reset_at` and, on denial, the
/// retry hint.
pub(crate) struct FixedWindow {
    store: Arc<dyn Store>,
    max_requests: i64,
    window_seconds: i64,
    options: Options,
    script: AtomicScript,
}

impl FixedWindow {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        max_requests: i64,
        window_seconds: i64,
        options: Options,
    ) -> Self {
        FixedWindow {
            store,
            max_requests,
            window_seconds,
            options,
            script: AtomicScript::new(FIXED_WINDOW_LUA),
        }
    }
}

#[async_trait]
impl Limiter for FixedWindow {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let limit = self.options.resolve_limit(key, self.max_requests);
        let keys = [self.options.format_key(key)];
        let args = [
            limit.to_string(),
            self.window_seconds.to_string(),
            n.to_string(),
        ];

        let reply = match self.script.invoke(&self.store, &keys, &args).await {
            Ok(reply) => reply,
            Err(err) => return self.options.fail_decision(limit, err),
        };

        let (allowed, remaining, ttl_secs) = decision_reply(reply)?;
        let ttl = Duration::from_secs(ttl_secs.max(0) as u64);

        Ok(Decision {
            allowed,
            remaining,
            limit,
            reset_at: Some(SystemTime::now() + ttl),
            retry_after: if allowed { Duration::ZERO } else { ttl },
        })
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.store.del(&[self.options.format_key(key)]).await
    }
}
