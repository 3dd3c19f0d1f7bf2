use std::{fmt, sync::Arc, time::Duration};

use redis::aio::ConnectionManager;

use crate::{
    Decision, FlowgateError,
    store::{RedisStore, Store},
};

/// Dynamic limit resolver: returns the effective limit for a key, or a value
/// `<= 0` to fall back to the construction-time default.
pub type LimitFn = Arc<dyn Fn(&str) -> i64 + Send + Sync>;

/// Configuration shared by every algorithm.
///
/// The defaults run in-process with the `"ratelimit"` key prefix and the
/// fail-open policy. Configure a store to run in distributed mode:
///
/// ```no_run
/// # async fn configure(manager: redis::aio::ConnectionManager) {
/// use flowgate::Options;
///
/// let options = Options::default()
///     .with_redis(manager)
///     .with_key_prefix("api")
///     .with_hash_tag(true);
/// # }
/// ```
#[derive(Clone)]
pub struct Options {
    /// Prefix prepended to every storage key. Default: `"ratelimit"`.
    pub key_prefix: String,

    /// Policy when the backend fails transiently: `true` (default) allows the
    /// request with a synthetic decision, `false` surfaces the error.
    pub fail_open: bool,

    /// Wrap the user key in braces (`prefix:{key}`) so a partitioned backend
    /// that hashes the braced substring routes every derived key for one
    /// caller to the same partition. Required for the sliding window counter
    /// on such backends, recommended for any of them.
    pub hash_tag: bool,

    /// Backend for rate limit state. `None` (default) selects the in-process
    /// engine variants.
    pub store: Option<Arc<dyn Store>>,

    /// Per-key limit resolver, consulted on every decision.
    pub limit_fn: Option<LimitFn>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            key_prefix: "ratelimit".to_string(),
            fail_open: true,
            hash_tag: false,
            store: None,
            limit_fn: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("key_prefix", &self.key_prefix)
            .field("fail_open", &self.fail_open)
            .field("hash_tag", &self.hash_tag)
            .field("store", &self.store.as_ref().map(|_| "..."))
            .field("limit_fn", &self.limit_fn.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Options {
    /// Set the prefix prepended to all storage keys.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the fail-open / fail-closed policy for transient backend errors.
    pub fn with_fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// Enable brace-wrapped key formatting for partitioned backends.
    pub fn with_hash_tag(mut self, hash_tag: bool) -> Self {
        self.hash_tag = hash_tag;
        self
    }

    /// Use a custom [`Store`] backend.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use Redis as the backing store. Shorthand for
    /// `with_store(Arc::new(RedisStore::new(manager)))`.
    pub fn with_redis(self, manager: ConnectionManager) -> Self {
        self.with_store(Arc::new(RedisStore::new(manager)))
    }

    /// Set a dynamic limit resolver, called with the request key on every
    /// decision. Returning `> 0` overrides the default limit for that key.
    pub fn with_limit_fn(mut self, f: impl Fn(&str) -> i64 + Send + Sync + 'static) -> Self {
        self.limit_fn = Some(Arc::new(f));
        self
    }

    /// The effective limit for `key`: the resolver's answer when positive,
    /// otherwise `default_limit`.
    pub(crate) fn resolve_limit(&self, key: &str, default_limit: i64) -> i64 {
        if let Some(f) = &self.limit_fn {
            let v = f(key);
            if v > 0 {
                return v;
            }
        }
        default_limit
    }

    /// Build a storage key: `prefix:key`, or `prefix:{key}` with hash-tag
    /// formatting enabled.
    pub(crate) fn format_key(&self, key: &str) -> String {
        if self.hash_tag {
            format!("{}:{{{}}}", self.key_prefix, key)
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    /// Build a storage key with a trailing suffix: `prefix:key:suffix` or
    /// `prefix:{key}:suffix`.
    pub(crate) fn format_key_suffix(&self, key: &str, suffix: impl fmt::Display) -> String {
        if self.hash_tag {
            format!("{}:{{{}}}:{}", self.key_prefix, key, suffix)
        } else {
            format!("{}:{}:{}", self.key_prefix, key, suffix)
        }
    }

    /// Apply the fail-open policy to a store error.
    ///
    /// Transient errors under fail-open become a synthetic allow; everything
    /// else surfaces to the caller, who treats `Err` as a denial.
    pub(crate) fn fail_decision(
        &self,
        limit: i64,
        err: FlowgateError,
    ) -> Result<Decision, FlowgateError> {
        if self.fail_open && err.is_transient() {
            tracing::warn!(error = %err, "backend unavailable, failing open");
            return Ok(Decision {
                allowed: true,
                remaining: limit - 1,
                limit,
                reset_at: None,
                retry_after: Duration::ZERO,
            });
        }
        Err(err)
    }
}
