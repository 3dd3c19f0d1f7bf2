use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use crate::{
    FlowgateError,
    store::{KeyTtl, Pipeline, Store, ZEntry},
};

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct Entry<T> {
    value: T,
    expire_at: Option<Instant>,
}

impl<T> Entry<T> {
    fn expired(&self) -> bool {
        matches!(self.expire_at, Some(at) if Instant::now() > at)
    }
}

#[derive(Default)]
struct Inner {
    data: BTreeMap<String, Entry<String>>,
    hashes: BTreeMap<String, Entry<BTreeMap<String, String>>>,
    sorted: BTreeMap<String, Entry<Vec<(f64, String)>>>,
}

impl Inner {
    fn evict_expired(&mut self) {
        self.data.retain(|_, e| !e.expired());
        self.hashes.retain(|_, e| !e.expired());
        self.sorted.retain(|_, e| !e.expired());
    }

    // The three maps share one logical keyspace, like the backends this
    // store stands in for.
    fn set_expiry(&mut self, key: &str, expire_at: Option<Instant>) -> bool {
        let mut found = false;
        if let Some(e) = self.data.get_mut(key) {
            e.expire_at = expire_at;
            found = true;
        }
        if let Some(e) = self.hashes.get_mut(key) {
            e.expire_at = expire_at;
            found = true;
        }
        if let Some(e) = self.sorted.get_mut(key) {
            e.expire_at = expire_at;
            found = true;
        }
        found
    }

    fn remove(&mut self, key: &str) {
        self.data.remove(key);
        self.hashes.remove(key);
        self.sorted.remove(key);
    }
}

/// In-memory [`Store`] for tests and single-process deployments.
///
/// All operations serialize on one mutex over ordered maps. Server-side
/// scripting is not available (`eval` and friends return
/// [`FlowgateError::ScriptUnsupported`]); algorithms that need atomic
/// scripts should run in-process instead, by not configuring a store.
///
/// A background sweeper evicts expired entries once per second and stops
/// when the store is closed or dropped.
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    closed: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let inner = Arc::new(Mutex::new(Inner::default()));
        let closed = Arc::new(AtomicBool::new(false));
        spawn_sweeper(Arc::downgrade(&inner), closed.clone());
        MemoryStore { inner, closed }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

fn spawn_sweeper(inner: Weak<Mutex<Inner>>, closed: Arc<AtomicBool>) {
    let _ = thread::Builder::new()
        .name("flowgate-store-sweeper".to_string())
        .spawn(move || {
            loop {
                thread::sleep(SWEEP_INTERVAL);
                if closed.load(Ordering::Relaxed) {
                    break;
                }
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .evict_expired();
            }
        });
}

#[async_trait]
impl Store for MemoryStore {
    async fn eval(
        &self,
        _script: &str,
        _keys: &[String],
        _args: &[String],
    ) -> Result<Vec<i64>, FlowgateError> {
        Err(FlowgateError::ScriptUnsupported)
    }

    async fn eval_sha(
        &self,
        _sha: &str,
        _keys: &[String],
        _args: &[String],
    ) -> Result<Vec<i64>, FlowgateError> {
        Err(FlowgateError::ScriptUnsupported)
    }

    async fn script_load(&self, _script: &str) -> Result<String, FlowgateError> {
        Err(FlowgateError::ScriptUnsupported)
    }

    async fn get(&self, key: &str) -> Result<String, FlowgateError> {
        let mut inner = self.inner();
        if let Some(e) = inner.data.get(key) {
            if !e.expired() {
                return Ok(e.value.clone());
            }
        }
        inner.data.remove(key);
        Err(FlowgateError::KeyNotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FlowgateError> {
        let expire_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.inner().data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expire_at,
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), FlowgateError> {
        let mut inner = self.inner();
        for key in keys {
            inner.remove(key);
        }
        Ok(())
    }

    async fn incr_by(&self, key: &str, n: i64) -> Result<i64, FlowgateError> {
        let mut inner = self.inner();
        if let Some(e) = inner.data.get_mut(key) {
            if !e.expired() {
                let current: i64 = e.value.parse().unwrap_or(0);
                let next = current + n;
                e.value = next.to_string();
                return Ok(next);
            }
        }
        inner.data.insert(
            key.to_string(),
            Entry {
                value: n.to_string(),
                expire_at: None,
            },
        );
        Ok(n)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), FlowgateError> {
        let mut inner = self.inner();
        if ttl.is_zero() {
            inner.remove(key);
            return Ok(());
        }
        inner.set_expiry(key, Some(Instant::now() + ttl));
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, FlowgateError> {
        let mut inner = self.inner();

        let expire_at = if let Some(e) = inner.data.get(key) {
            Some(e.expire_at)
        } else if let Some(e) = inner.hashes.get(key) {
            Some(e.expire_at)
        } else if let Some(e) = inner.sorted.get(key) {
            Some(e.expire_at)
        } else {
            None
        };

        match expire_at {
            None => Ok(KeyTtl::Missing),
            Some(None) => Ok(KeyTtl::Persistent),
            Some(Some(at)) => {
                let now = Instant::now();
                if now > at {
                    inner.remove(key);
                    return Ok(KeyTtl::Missing);
                }
                Ok(KeyTtl::Remaining(at - now))
            }
        }
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, FlowgateError> {
        let inner = self.inner();
        match inner.hashes.get(key) {
            Some(e) if !e.expired() => Ok(e
                .value
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()),
            _ => Ok(HashMap::new()),
        }
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), FlowgateError> {
        let mut inner = self.inner();
        let entry = inner.hashes.entry(key.to_string()).or_insert_with(|| Entry {
            value: BTreeMap::new(),
            expire_at: None,
        });
        if entry.expired() {
            entry.value.clear();
            entry.expire_at = None;
        }
        for (field, value) in fields {
            entry.value.insert(field.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), FlowgateError> {
        let mut inner = self.inner();
        let entry = inner.sorted.entry(key.to_string()).or_insert_with(|| Entry {
            value: Vec::new(),
            expire_at: None,
        });
        if entry.expired() {
            entry.value.clear();
            entry.expire_at = None;
        }
        entry.value.retain(|(_, m)| m != member);
        entry.value.push((score, member.to_string()));
        entry
            .value
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<i64, FlowgateError> {
        let inner = self.inner();
        match inner.sorted.get(key) {
            Some(e) if !e.expired() => Ok(e.value.len() as i64),
            _ => Ok(0),
        }
    }

    async fn zrem_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<(), FlowgateError> {
        let mut inner = self.inner();
        if let Some(e) = inner.sorted.get_mut(key) {
            e.value.retain(|(score, _)| *score < min || *score > max);
        }
        Ok(())
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<ZEntry>, FlowgateError> {
        let inner = self.inner();
        let Some(e) = inner.sorted.get(key).filter(|e| !e.expired()) else {
            return Ok(Vec::new());
        };

        let n = e.value.len() as i64;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut start = if start < 0 { n + start } else { start };
        let mut stop = if stop < 0 { n + stop } else { stop };
        start = start.max(0);
        stop = stop.min(n - 1);
        if start > stop {
            return Ok(Vec::new());
        }

        Ok(e.value[start as usize..=stop as usize]
            .iter()
            .map(|(score, member)| ZEntry {
                score: *score,
                member: member.clone(),
            })
            .collect())
    }

    fn pipeline(&self) -> Box<dyn Pipeline> {
        Box::new(MemoryPipeline {
            inner: self.inner.clone(),
            ops: Vec::new(),
        })
    }

    async fn close(&self) -> Result<(), FlowgateError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

enum PipelineOp {
    ZAdd {
        key: String,
        score: f64,
        member: String,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
}

struct MemoryPipeline {
    inner: Arc<Mutex<Inner>>,
    ops: Vec<PipelineOp>,
}

#[async_trait]
impl Pipeline for MemoryPipeline {
    fn zadd(&mut self, key: &str, score: f64, member: &str) {
        self.ops.push(PipelineOp::ZAdd {
            key: key.to_string(),
            score,
            member: member.to_string(),
        });
    }

    fn expire(&mut self, key: &str, ttl: Duration) {
        self.ops.push(PipelineOp::Expire {
            key: key.to_string(),
            ttl,
        });
    }

    async fn exec(mut self: Box<Self>) -> Result<(), FlowgateError> {
        let ops = std::mem::take(&mut self.ops);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for op in ops {
            match op {
                PipelineOp::ZAdd { key, score, member } => {
                    let entry = inner.sorted.entry(key).or_insert_with(|| Entry {
                        value: Vec::new(),
                        expire_at: None,
                    });
                    entry.value.retain(|(_, m)| *m != member);
                    entry.value.push((score, member));
                    entry.value.sort_by(|a, b| {
                        a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal)
                    });
                }
                PipelineOp::Expire { key, ttl } => {
                    if ttl.is_zero() {
                        inner.remove(&key);
                    } else {
                        inner.set_expiry(&key, Some(Instant::now() + ttl));
                    }
                }
            }
        }
        Ok(())
    }
}
