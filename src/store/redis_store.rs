use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::{
    FlowgateError,
    store::{KeyTtl, Pipeline, Store, ZEntry},
};

/// Redis-backed [`Store`].
///
/// Wraps a [`ConnectionManager`], which multiplexes one reconnecting
/// connection across concurrent callers, so the store is cheap to share.
/// Every decision script runs server-side and therefore atomically.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub fn new(manager: ConnectionManager) -> Self {
        RedisStore { manager }
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn map_err(err: redis::RedisError) -> FlowgateError {
    if err.is_timeout() {
        return FlowgateError::DeadlineExceeded;
    }
    if err.kind() == redis::ErrorKind::TypeError {
        return FlowgateError::BadReply(err.to_string());
    }
    FlowgateError::Backend(err)
}

#[async_trait]
impl Store for RedisStore {
    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<Vec<i64>, FlowgateError> {
        let mut conn = self.conn();
        redis::cmd("EVAL")
            .arg(script)
            .arg(keys.len())
            .arg(keys)
            .arg(args)
            .query_async(&mut conn)
            .await
            .map_err(map_err)
    }

    async fn eval_sha(
        &self,
        sha: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<Vec<i64>, FlowgateError> {
        let mut conn = self.conn();
        redis::cmd("EVALSHA")
            .arg(sha)
            .arg(keys.len())
            .arg(keys)
            .arg(args)
            .query_async(&mut conn)
            .await
            .map_err(map_err)
    }

    async fn script_load(&self, script: &str) -> Result<String, FlowgateError> {
        let mut conn = self.conn();
        redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(script)
            .query_async(&mut conn)
            .await
            .map_err(map_err)
    }

    async fn get(&self, key: &str) -> Result<String, FlowgateError> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await.map_err(map_err)?;
        value.ok_or_else(|| FlowgateError::KeyNotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FlowgateError> {
        let mut conn = self.conn();
        if ttl.is_zero() {
            let _: () = conn.set(key, value).await.map_err(map_err)?;
        } else {
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await
                .map_err(map_err)?;
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), FlowgateError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _: () = conn.del(keys).await.map_err(map_err)?;
        Ok(())
    }

    async fn incr_by(&self, key: &str, n: i64) -> Result<i64, FlowgateError> {
        let mut conn = self.conn();
        conn.incr(key, n).await.map_err(map_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), FlowgateError> {
        let mut conn = self.conn();
        // PEXPIRE with 0 removes the key immediately.
        let _: () = conn
            .pexpire(key, ttl.as_millis() as i64)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, FlowgateError> {
        let mut conn = self.conn();
        let ms: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(match ms {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::Remaining(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, FlowgateError> {
        let mut conn = self.conn();
        conn.hgetall(key).await.map_err(map_err)
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), FlowgateError> {
        let mut conn = self.conn();
        let _: () = conn.hset_multiple(key, fields).await.map_err(map_err)?;
        Ok(())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), FlowgateError> {
        let mut conn = self.conn();
        let _: () = conn.zadd(key, member, score).await.map_err(map_err)?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<i64, FlowgateError> {
        let mut conn = self.conn();
        conn.zcard(key).await.map_err(map_err)
    }

    async fn zrem_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<(), FlowgateError> {
        let mut conn = self.conn();
        let _: () = conn.zrembyscore(key, min, max).await.map_err(map_err)?;
        Ok(())
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<ZEntry>, FlowgateError> {
        let mut conn = self.conn();
        let entries: Vec<(String, f64)> = conn
            .zrange_withscores(key, start as isize, stop as isize)
            .await
            .map_err(map_err)?;
        Ok(entries
            .into_iter()
            .map(|(member, score)| ZEntry { score, member })
            .collect())
    }

    fn pipeline(&self) -> Box<dyn Pipeline> {
        Box::new(RedisPipeline {
            conn: self.conn(),
            pipe: redis::pipe(),
        })
    }

    async fn close(&self) -> Result<(), FlowgateError> {
        // The multiplexed connection closes when the last clone drops.
        Ok(())
    }
}

struct RedisPipeline {
    conn: ConnectionManager,
    pipe: redis::Pipeline,
}

#[async_trait]
impl Pipeline for RedisPipeline {
    fn zadd(&mut self, key: &str, score: f64, member: &str) {
        self.pipe.zadd(key, member, score).ignore();
    }

    fn expire(&mut self, key: &str, ttl: Duration) {
        self.pipe.pexpire(key, ttl.as_millis() as i64).ignore();
    }

    async fn exec(mut self: Box<Self>) -> Result<(), FlowgateError> {
        let _: () = self
            .pipe
            .query_async(&mut self.conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
