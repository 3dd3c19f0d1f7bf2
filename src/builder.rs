use std::{sync::Arc, time::Duration};

use redis::aio::ConnectionManager;

use crate::{
    FlowgateError, LeakyBucketMode, Limiter, Options,
    fixed_window, gcra, leaky_bucket, sliding_window, sliding_window_counter,
    store::Store, token_bucket,
};

enum Algorithm {
    FixedWindow { max_requests: i64, window_seconds: i64 },
    SlidingWindow { max_requests: i64, window_seconds: i64 },
    SlidingWindowCounter { max_requests: i64, window_seconds: i64 },
    TokenBucket { capacity: i64, refill_rate: i64 },
    LeakyBucket { capacity: i64, leak_rate: i64, mode: LeakyBucketMode },
    Gcra { rate: i64, burst: i64 },
}

/// Fluent construction of a [`Limiter`]: pick one algorithm, stack options,
/// finalize with [`Builder::build`].
///
/// ```no_run
/// # async fn build(manager: redis::aio::ConnectionManager) {
/// use std::time::Duration;
/// use flowgate::Builder;
///
/// let limiter = Builder::new()
///     .sliding_window_counter(100, Duration::from_secs(60))
///     .redis(manager)
///     .hash_tag()
///     .build()
///     .unwrap();
/// # }
/// ```
#[derive(Default)]
pub struct Builder {
    algorithm: Option<Algorithm>,
    options: Options,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    /// Select the fixed window algorithm: `max_requests` per `window`.
    pub fn fixed_window(mut self, max_requests: i64, window: Duration) -> Self {
        self.algorithm = Some(Algorithm::FixedWindow {
            max_requests,
            window_seconds: window.as_secs() as i64,
        });
        self
    }

    /// Select the sliding window log algorithm: `max_requests` per `window`,
    /// exact but with one stored timestamp per accepted request.
    pub fn sliding_window(mut self, max_requests: i64, window: Duration) -> Self {
        self.algorithm = Some(Algorithm::SlidingWindow {
            max_requests,
            window_seconds: window.as_secs() as i64,
        });
        self
    }

    /// Select the sliding window counter algorithm: `max_requests` per
    /// `window` with the O(1)-memory weighted approximation.
    pub fn sliding_window_counter(mut self, max_requests: i64, window: Duration) -> Self {
        self.algorithm = Some(Algorithm::SlidingWindowCounter {
            max_requests,
            window_seconds: window.as_secs() as i64,
        });
        self
    }

    /// Select the token bucket algorithm.
    pub fn token_bucket(mut self, capacity: i64, refill_rate: i64) -> Self {
        self.algorithm = Some(Algorithm::TokenBucket {
            capacity,
            refill_rate,
        });
        self
    }

    /// Select the leaky bucket algorithm in the given mode.
    pub fn leaky_bucket(mut self, capacity: i64, leak_rate: i64, mode: LeakyBucketMode) -> Self {
        self.algorithm = Some(Algorithm::LeakyBucket {
            capacity,
            leak_rate,
            mode,
        });
        self
    }

    /// Select the GCRA algorithm.
    pub fn gcra(mut self, rate: i64, burst: i64) -> Self {
        self.algorithm = Some(Algorithm::Gcra { rate, burst });
        self
    }

    /// Back the limiter with Redis.
    pub fn redis(mut self, manager: ConnectionManager) -> Self {
        self.options = self.options.with_redis(manager);
        self
    }

    /// Back the limiter with a custom [`Store`].
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.options = self.options.with_store(store);
        self
    }

    /// Set the prefix prepended to all storage keys.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options = self.options.with_key_prefix(prefix);
        self
    }

    /// Enable brace-wrapped key formatting for partitioned backends.
    pub fn hash_tag(mut self) -> Self {
        self.options = self.options.with_hash_tag(true);
        self
    }

    /// Set the fail-open / fail-closed policy for transient backend errors.
    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.options = self.options.with_fail_open(fail_open);
        self
    }

    /// Set a dynamic per-key limit resolver.
    pub fn limit_fn(mut self, f: impl Fn(&str) -> i64 + Send + Sync + 'static) -> Self {
        self.options = self.options.with_limit_fn(f);
        self
    }

    /// Validate the configuration and construct the limiter.
    pub fn build(self) -> Result<Arc<dyn Limiter>, FlowgateError> {
        let Some(algorithm) = self.algorithm else {
            return Err(FlowgateError::InvalidParameter(
                "no algorithm selected; call fixed_window, sliding_window, \
                 sliding_window_counter, token_bucket, leaky_bucket, or gcra before build"
                    .to_string(),
            ));
        };

        match algorithm {
            Algorithm::FixedWindow {
                max_requests,
                window_seconds,
            } => fixed_window(max_requests, window_seconds, self.options),
            Algorithm::SlidingWindow {
                max_requests,
                window_seconds,
            } => sliding_window(max_requests, window_seconds, self.options),
            Algorithm::SlidingWindowCounter {
                max_requests,
                window_seconds,
            } => sliding_window_counter(max_requests, window_seconds, self.options),
            Algorithm::TokenBucket {
                capacity,
                refill_rate,
            } => token_bucket(capacity, refill_rate, self.options),
            Algorithm::LeakyBucket {
                capacity,
                leak_rate,
                mode,
            } => leaky_bucket(capacity, leak_rate, mode, self.options),
            Algorithm::Gcra { rate, burst } => gcra(rate, burst, self.options),
        }
    }
}
