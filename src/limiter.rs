use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;

use crate::{FlowgateError, Options, distributed, local};

/// The outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the request is permitted.
    pub allowed: bool,
    /// Quota still available to this key after the decision.
    pub remaining: i64,
    /// The effective limit applied to this decision (may be dynamic, see
    /// [`Options::with_limit_fn`]).
    pub limit: i64,
    /// Wall-clock instant when the quota next resets.
    ///
    /// Unset for algorithms without a fixed window boundary.
    pub reset_at: Option<SystemTime>,
    /// On denial: a lower bound on how long to wait before retrying.
    ///
    /// A shaping leaky bucket also sets this on *allowed* decisions, where it
    /// is the queued delay the caller must honor before proceeding.
    pub retry_after: Duration,
}

impl Decision {
    pub(crate) fn denied(limit: i64, retry_after: Duration) -> Self {
        Decision {
            allowed: false,
            remaining: 0,
            limit,
            reset_at: None,
            retry_after,
        }
    }
}

/// The core capability set shared by all rate limiting algorithms.
///
/// Every engine, in-process or store-backed, is used through this trait, so
/// algorithms stay swappable without changing caller code. All engines are
/// safe for concurrent use; share them via the `Arc` the constructors return.
///
/// Decision futures suspend only at the store round-trip; dropping one
/// cancels the check. Callers that need a hard deadline wrap the call in
/// `tokio::time::timeout`.
impl std::fmt::Debug for dyn Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Limiter")
    }
}

#[async_trait]
pub trait Limiter: Send + Sync {
    /// Check whether a single request identified by `key` may proceed.
    async fn allow(&self, key: &str) -> Result<Decision, FlowgateError> {
        self.allow_n(key, 1).await
    }

    /// Check whether `n` requests identified by `key` may proceed, charging
    /// all of them on success.
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError>;

    /// Clear all rate limit state for `key`.
    async fn reset(&self, key: &str) -> Result<(), FlowgateError>;
}

/// Operating mode of a leaky bucket limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakyBucketMode {
    /// Reject requests that would overflow the bucket.
    Policing,
    /// Queue requests by assigning each a processing delay.
    Shaping,
}

fn require_positive(value: i64, name: &str) -> Result<(), FlowgateError> {
    if value <= 0 {
        return Err(FlowgateError::InvalidParameter(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(())
}

/// Create a Fixed Window rate limiter.
///
/// `max_requests` is the maximum requests allowed per window; `window_seconds`
/// is the window duration. Configure a store via [`Options`] for distributed
/// mode; the default options run in-process.
pub fn fixed_window(
    max_requests: i64,
    window_seconds: i64,
    options: Options,
) -> Result<Arc<dyn Limiter>, FlowgateError> {
    require_positive(max_requests, "max_requests")?;
    require_positive(window_seconds, "window_seconds")?;

    Ok(match options.store.clone() {
        Some(store) => Arc::new(distributed::FixedWindow::new(
            store,
            max_requests,
            window_seconds,
            options,
        )),
        None => Arc::new(local::FixedWindow::new(max_requests, window_seconds, options)),
    })
}

/// Create a Sliding Window Log rate limiter.
///
/// Stores one timestamp per accepted request, so memory is linear in the
/// per-window request count. For high-throughput keys prefer
/// [`sliding_window_counter`].
pub fn sliding_window(
    max_requests: i64,
    window_seconds: i64,
    options: Options,
) -> Result<Arc<dyn Limiter>, FlowgateError> {
    require_positive(max_requests, "max_requests")?;
    require_positive(window_seconds, "window_seconds")?;

    Ok(match options.store.clone() {
        Some(store) => Arc::new(distributed::SlidingWindowLog::new(
            store,
            max_requests,
            window_seconds,
            options,
        )),
        None => Arc::new(local::SlidingWindowLog::new(
            max_requests,
            window_seconds,
            options,
        )),
    })
}

/// Create a Sliding Window Counter rate limiter.
///
/// The weighted two-counter approximation: O(1) memory per key, about 1%
/// error in steady state. The default recommendation for most callers.
pub fn sliding_window_counter(
    max_requests: i64,
    window_seconds: i64,
    options: Options,
) -> Result<Arc<dyn Limiter>, FlowgateError> {
    require_positive(max_requests, "max_requests")?;
    require_positive(window_seconds, "window_seconds")?;

    Ok(match options.store.clone() {
        Some(store) => Arc::new(distributed::SlidingWindowCounter::new(
            store,
            max_requests,
            window_seconds,
            options,
        )),
        None => Arc::new(local::SlidingWindowCounter::new(
            max_requests,
            window_seconds,
            options,
        )),
    })
}

/// Create a Token Bucket rate limiter.
///
/// `capacity` is the burst size; `refill_rate` is tokens added per second.
pub fn token_bucket(
    capacity: i64,
    refill_rate: i64,
    options: Options,
) -> Result<Arc<dyn Limiter>, FlowgateError> {
    require_positive(capacity, "capacity")?;
    require_positive(refill_rate, "refill_rate")?;

    Ok(match options.store.clone() {
        Some(store) => Arc::new(distributed::TokenBucket::new(
            store,
            capacity,
            refill_rate,
            options,
        )),
        None => Arc::new(local::TokenBucket::new(capacity, refill_rate, options)),
    })
}

/// Create a Leaky Bucket rate limiter.
///
/// `capacity` is the bucket size; `leak_rate` is units drained per second.
/// `mode` selects [`LeakyBucketMode::Policing`] (hard reject on overflow) or
/// [`LeakyBucketMode::Shaping`] (queue with delay).
pub fn leaky_bucket(
    capacity: i64,
    leak_rate: i64,
    mode: LeakyBucketMode,
    options: Options,
) -> Result<Arc<dyn Limiter>, FlowgateError> {
    require_positive(capacity, "capacity")?;
    require_positive(leak_rate, "leak_rate")?;

    Ok(match options.store.clone() {
        Some(store) => Arc::new(distributed::LeakyBucket::new(
            store, capacity, leak_rate, mode, options,
        )),
        None => Arc::new(local::LeakyBucket::new(capacity, leak_rate, mode, options)),
    })
}

/// Create a GCRA (Generic Cell Rate Algorithm) rate limiter.
///
/// `rate` is the sustained requests per second; `burst` is the maximum burst.
pub fn gcra(rate: i64, burst: i64, options: Options) -> Result<Arc<dyn Limiter>, FlowgateError> {
    require_positive(rate, "rate")?;
    require_positive(burst, "burst")?;

    Ok(match options.store.clone() {
        Some(store) => Arc::new(distributed::Gcra::new(store, rate, burst, options)),
        None => Arc::new(local::Gcra::new(rate, burst, options)),
    })
}
