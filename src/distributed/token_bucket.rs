use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    Decision, FlowgateError, Limiter, Options,
    distributed::{AtomicScript, decision_reply, unix_now_secs_f64},
    store::Store,
};

// "now" comes from the caller, not the server clock, so the in-process and
// store-backed variants share one time source.
const TOKEN_BUCKET_LUA: &str = r#"
local key = KEYS[1]
local max_tokens = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])

local data = redis.call('HGETALL', key)
local tokens = max_tokens
local last_refill = now

if #data > 0 then
  local fields = {}
  for i = 1, #data, 2 do
    fields[data[i]] = data[i + 1]
  end
  tokens = tonumber(fields['tokens']) or max_tokens
  last_refill = tonumber(fields['last_refill']) or now
end

local elapsed = now - last_refill
tokens = math.min(max_tokens, tokens + elapsed * refill_rate)

local allowed = 0
local remaining = math.floor(tokens)
local retry_after = 0

if tokens >= cost then
  tokens = tokens - cost
  remaining = math.floor(tokens)
  allowed = 1
else
  local deficit = cost - tokens
  retry_after = math.ceil(deficit / refill_rate)
end

redis.call('HSET', key, 'tokens', tostring(tokens), 'last_refill', tostring(now))
redis.call('EXPIRE', key, math.ceil(max_tokens / refill_rate) + 1)

return { allowed, remaining, retry_after }
"#;

/// Token bucket over a shared store.
///
/// State is a two-field hash per caller; the TTL is the time a drained
/// bucket takes to refill completely, plus one second of slack.
pub(crate) struct TokenBucket {
    store: Arc<dyn Store>,
    capacity: i64,
    refill_rate: i64,
    options: Options,
    script: AtomicScript,
}

impl TokenBucket {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        capacity: i64,
        refill_rate: i64,
        options: Options,
    ) -> Self {
        TokenBucket {
            store,
            capacity,
            refill_rate,
            options,
            script: AtomicScript::new(TOKEN_BUCKET_LUA),
        }
    }
}

#[async_trait]
impl Limiter for TokenBucket {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        let capacity = self.options.resolve_limit(key, self.capacity);
        let keys = [self.options.format_key(key)];
        let args = [
            capacity.to_string(),
            self.refill_rate.to_string(),
            unix_now_secs_f64().to_string(),
            n.to_string(),
        ];

        let reply = match self.script.invoke(&self.store, &keys, &args).await {
            Ok(reply) => reply,
            Err(err) => return self.options.fail_decision(capacity, err),
        };

        let (allowed, remaining, retry_secs) = decision_reply(reply)?;

        Ok(Decision {
            allowed,
            remaining,
            limit: capacity,
            reset_at: None,
            retry_after: Duration::from_secs(retry_secs.max(0) as u64),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.store.del(&[self.options.format_key(key)]).await
    }
}
