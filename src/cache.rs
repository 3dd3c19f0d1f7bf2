//! An L1 in-process cache that wraps any [`Limiter`].
//!
//! At scale even a fast backend adds a round-trip per request. The cache sits
//! in front of the backing limiter and serves most checks locally by caching
//! decisions and tracking request counts between syncs:
//!
//! - cached allow with local quota remaining: served locally;
//! - cached denial: served locally until its retry hint elapses, so a
//!   rate-limited key cannot stampede the backend;
//! - miss, expired entry, or exhausted local quota: sync with the backend.
//!
//! Accuracy degrades by at most one cache TTL of staleness per process;
//! shorter TTLs trade backend load for precision.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Decision, FlowgateError, Limiter};

/// Configuration for [`CachedLimiter`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// How long a cached decision stays servable before the next request for
    /// its key syncs with the backend.
    pub ttl: Duration,
    /// Maximum number of cached keys; the oldest entry is evicted when the
    /// cache grows past this.
    pub max_keys: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            ttl: Duration::from_millis(100),
            max_keys: 100_000,
        }
    }
}

/// Cache statistics, see [`CachedLimiter::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub keys: usize,
}

struct CacheEntry {
    decision: Decision,
    local_used: i64,
    fetched_at: Instant,
}

fn entry_expired(entry: &CacheEntry, ttl: Duration) -> bool {
    let mut ttl = ttl;
    // Re-check denied keys as soon as the backend might allow them again.
    if !entry.decision.allowed
        && entry.decision.retry_after > Duration::ZERO
        && entry.decision.retry_after < ttl
    {
        ttl = entry.decision.retry_after;
    }
    entry.fetched_at.elapsed() >= ttl
}

/// A drop-in [`Limiter`] that caches another limiter's decisions in-process.
pub struct CachedLimiter {
    inner: Arc<dyn Limiter>,
    options: CacheOptions,
    entries: Arc<DashMap<String, CacheEntry>>,
    closed: Arc<AtomicBool>,
}

impl CachedLimiter {
    /// Wrap `inner` with a cache layer.
    pub fn new(inner: Arc<dyn Limiter>, options: CacheOptions) -> Self {
        let entries: Arc<DashMap<String, CacheEntry>> = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        spawn_eviction_loop(Arc::downgrade(&entries), closed.clone(), options.ttl);

        CachedLimiter {
            inner,
            options,
            entries,
            closed,
        }
    }

    /// Stop the background eviction thread. Idempotent; cached entries are
    /// still served until they expire or the limiter is dropped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// Current cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            keys: self.entries.len(),
        }
    }

    fn evict_if_over_capacity(&self) {
        if self.entries.len() <= self.options.max_keys {
            return;
        }

        let mut oldest: Option<(String, Instant)> = None;
        for entry in self.entries.iter() {
            match &oldest {
                Some((_, at)) if *at <= entry.fetched_at => {}
                _ => oldest = Some((entry.key().clone(), entry.fetched_at)),
            }
        }
        if let Some((key, _)) = oldest {
            self.entries.remove(&key);
        }
    }
}

fn spawn_eviction_loop(
    entries: Weak<DashMap<String, CacheEntry>>,
    closed: Arc<AtomicBool>,
    ttl: Duration,
) {
    let _ = thread::Builder::new()
        .name("flowgate-cache-eviction".to_string())
        .spawn(move || {
            loop {
                thread::sleep(Duration::from_secs(1));
                if closed.load(Ordering::Relaxed) {
                    break;
                }
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                entries.retain(|_, entry| !entry_expired(entry, ttl));
            }
        });
}

#[async_trait]
impl Limiter for CachedLimiter {
    async fn allow_n(&self, key: &str, n: u32) -> Result<Decision, FlowgateError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry_expired(&entry, self.options.ttl) {
                if !entry.decision.allowed {
                    return Ok(entry.decision.clone());
                }

                let cost = n as i64;
                if entry.decision.remaining - entry.local_used >= cost {
                    entry.local_used += cost;
                    return Ok(Decision {
                        allowed: true,
                        remaining: entry.decision.remaining - entry.local_used,
                        limit: entry.decision.limit,
                        reset_at: entry.decision.reset_at,
                        retry_after: Duration::ZERO,
                    });
                }
                // Local quota exhausted; fall through and sync.
            }
        }

        let decision = self.inner.allow_n(key, n).await?;

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                decision: decision.clone(),
                local_used: 0,
                fetched_at: Instant::now(),
            },
        );
        self.evict_if_over_capacity();

        Ok(decision)
    }

    async fn reset(&self, key: &str) -> Result<(), FlowgateError> {
        self.entries.remove(key);
        self.inner.reset(key).await
    }
}
