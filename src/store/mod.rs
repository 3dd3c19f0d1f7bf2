//! Backend storage contract for the distributed rate limiters.
//!
//! [`Store`] abstracts the operations the store-backed algorithms need. The
//! primary implementation is [`RedisStore`], which runs every decision as an
//! atomic server-side script. [`MemoryStore`] supplies the same key/value,
//! hash, and sorted-set operations for tests and single-process deployments,
//! but does not execute scripts; the in-process engine variants cover that
//! case without a store at all.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;

use crate::FlowgateError;

mod memory;
pub use memory::MemoryStore;

mod redis_store;
pub use redis_store::RedisStore;

/// A sorted set member with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ZEntry {
    pub score: f64,
    pub member: String,
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key exists and expires after this duration.
    Remaining(Duration),
    /// The key exists and has no expiry.
    Persistent,
    /// The key does not exist.
    Missing,
}

/// Backend for rate limit state. Implementations must be safe for concurrent
/// use from multiple tasks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Execute a script atomically with the given keys and args.
    ///
    /// Backends without server-side scripting return
    /// [`FlowgateError::ScriptUnsupported`]. Scripts used by this crate reply
    /// with arrays of integers, which is the only reply shape supported.
    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<Vec<i64>, FlowgateError>;

    /// Execute a pre-loaded script by its SHA1 hash.
    async fn eval_sha(
        &self,
        sha: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<Vec<i64>, FlowgateError>;

    /// Load a script into the backend's cache, returning its SHA1.
    async fn script_load(&self, script: &str) -> Result<String, FlowgateError>;

    /// Fetch the string value for `key`.
    ///
    /// Returns [`FlowgateError::KeyNotFound`] when the key is absent.
    async fn get(&self, key: &str) -> Result<String, FlowgateError>;

    /// Store a value. A zero `ttl` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FlowgateError>;

    /// Delete the given keys.
    async fn del(&self, keys: &[String]) -> Result<(), FlowgateError>;

    /// Atomically increment `key` by `n`, returning the new value. Absent
    /// keys are created holding `n`.
    async fn incr_by(&self, key: &str, n: i64) -> Result<i64, FlowgateError>;

    /// Set a TTL on an existing key. A zero `ttl` marks the key for
    /// immediate eviction.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), FlowgateError>;

    /// Remaining lifetime of `key`.
    async fn ttl(&self, key: &str) -> Result<KeyTtl, FlowgateError>;

    /// All fields and values of the hash stored at `key`.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, FlowgateError>;

    /// Set fields in the hash stored at `key`.
    async fn hash_set(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), FlowgateError>;

    /// Add a member with a score to the sorted set at `key`, replacing the
    /// member's previous score if present.
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), FlowgateError>;

    /// Number of members in the sorted set at `key`.
    async fn zcard(&self, key: &str) -> Result<i64, FlowgateError>;

    /// Remove sorted set members with scores in `[min, max]`.
    async fn zrem_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<(), FlowgateError>;

    /// Members with scores in the index range `[start, stop]`. Negative
    /// indices count from the end, as in `ZRANGE`.
    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<ZEntry>, FlowgateError>;

    /// A batch handle for deferred commands in a single round-trip.
    fn pipeline(&self) -> Box<dyn Pipeline>;

    /// Release any resources held by the store. Idempotent.
    async fn close(&self) -> Result<(), FlowgateError>;
}

/// Batches commands for a single round-trip. Commands queue locally until
/// [`Pipeline::exec`] sends them and returns the batch's aggregate error.
#[async_trait]
pub trait Pipeline: Send {
    fn zadd(&mut self, key: &str, score: f64, member: &str);
    fn expire(&mut self, key: &str, ttl: Duration);
    async fn exec(self: Box<Self>) -> Result<(), FlowgateError>;
}
