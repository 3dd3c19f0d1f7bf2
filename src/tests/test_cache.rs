use std::{sync::Arc, time::Duration};

use crate::{CacheOptions, CachedLimiter, Limiter, Options, fixed_window};

fn cached(max_requests: i64, window_seconds: i64, ttl: Duration) -> CachedLimiter {
    let inner = fixed_window(max_requests, window_seconds, Options::default()).unwrap();
    CachedLimiter::new(
        inner,
        CacheOptions {
            ttl,
            max_keys: 100,
        },
    )
}

#[tokio::test]
async fn serves_allows_locally_against_the_cached_remaining() {
    let limiter = cached(10, 60, Duration::from_secs(5));

    // First call syncs; the rest spend the cached quota.
    let d = limiter.allow("k").await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 9);

    for expected_remaining in [8, 7, 6] {
        let d = limiter.allow("k").await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.remaining, expected_remaining);
    }

    assert_eq!(limiter.stats().keys, 1);
}

#[tokio::test]
async fn syncs_once_the_local_quota_is_spent() {
    let limiter = cached(2, 60, Duration::from_secs(5));

    assert!(limiter.allow("k").await.unwrap().allowed); // backend: 1 used
    assert!(limiter.allow("k").await.unwrap().allowed); // local
    assert!(limiter.allow("k").await.unwrap().allowed); // sync, backend: 2 used

    let d = limiter.allow("k").await.unwrap();
    assert!(!d.allowed);
    assert!(d.retry_after > Duration::ZERO);
}

#[tokio::test]
async fn cached_denials_are_served_without_the_backend() {
    let inner = fixed_window(1, 60, Options::default()).unwrap();
    let counting = Arc::new(CountingLimiter {
        inner,
        calls: std::sync::atomic::AtomicUsize::new(0),
    });
    let limiter = CachedLimiter::new(
        counting.clone(),
        CacheOptions {
            ttl: Duration::from_secs(5),
            max_keys: 100,
        },
    );

    assert!(limiter.allow("k").await.unwrap().allowed);
    assert!(!limiter.allow("k").await.unwrap().allowed);
    let backend_calls = counting.calls.load(std::sync::atomic::Ordering::Relaxed);

    // Repeated denials stay local while the retry hint has not elapsed.
    for _ in 0..5 {
        assert!(!limiter.allow("k").await.unwrap().allowed);
    }
    assert_eq!(
        counting.calls.load(std::sync::atomic::Ordering::Relaxed),
        backend_calls
    );
}

#[tokio::test]
async fn expired_entries_resync_with_the_backend() {
    let limiter = cached(1, 1, Duration::from_millis(50));

    assert!(limiter.allow("k").await.unwrap().allowed);
    assert!(!limiter.allow("k").await.unwrap().allowed);

    // Window and cache entry both roll over.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(limiter.allow("k").await.unwrap().allowed);
}

#[tokio::test]
async fn reset_clears_cache_and_backend() {
    let limiter = cached(1, 60, Duration::from_secs(5));

    assert!(limiter.allow("k").await.unwrap().allowed);
    assert!(!limiter.allow("k").await.unwrap().allowed);

    limiter.reset("k").await.unwrap();
    assert!(limiter.allow("k").await.unwrap().allowed);
}

#[tokio::test]
async fn close_is_idempotent() {
    let limiter = cached(1, 60, Duration::from_secs(5));
    limiter.close();
    limiter.close();

    assert!(limiter.allow("k").await.unwrap().allowed);
}

struct CountingLimiter {
    inner: Arc<dyn Limiter>,
    calls: std::sync::atomic::AtomicUsize,
}

#[async_trait::async_trait]
impl Limiter for CountingLimiter {
    async fn allow_n(&self, key: &str, n: u32) -> Result<crate::Decision, crate::FlowgateError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.inner.allow_n(key, n).await
    }

    async fn reset(&self, key: &str) -> Result<(), crate::FlowgateError> {
        self.inner.reset(key).await
    }
}
