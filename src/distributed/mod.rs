//! Store-backed engine variants.
//!
//! Each engine keeps no per-key state of its own: every decision runs as one
//! atomic script on the configured [`Store`](crate::store::Store), so
//! concurrent processes sharing a backend observe a single total order of
//! decisions. The caller's wall clock is passed into each script, keeping the
//! time source identical to the in-process variants; precision is bounded by
//! clock skew between the participating processes.
//!
//! Every script re-asserts a TTL sized to the algorithm's horizon so that
//! quiescent keys expire on the backend.

use std::{
    sync::{Arc, OnceLock},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{FlowgateError, store::Store};

mod fixed_window;
pub(crate) use fixed_window::FixedWindow;

mod sliding_window;
pub(crate) use sliding_window::SlidingWindowLog;

mod sliding_window_counter;
pub(crate) use sliding_window_counter::SlidingWindowCounter;

mod token_bucket;
pub(crate) use token_bucket::TokenBucket;

mod leaky_bucket;
pub(crate) use leaky_bucket::LeakyBucket;

mod gcra;
pub(crate) use gcra::Gcra;

/// A server-side script invoked by hash, loading on first use and falling
/// back to the full source when the backend's script cache was flushed.
pub(crate) struct AtomicScript {
    source: &'static str,
    sha: OnceLock<String>,
}

impl AtomicScript {
    pub(crate) const fn new(source: &'static str) -> Self {
        AtomicScript {
            source,
            sha: OnceLock::new(),
        }
    }

    pub(crate) async fn invoke(
        &self,
        store: &Arc<dyn Store>,
        keys: &[String],
        args: &[String],
    ) -> Result<Vec<i64>, FlowgateError> {
        let sha = match self.sha.get() {
            Some(sha) => sha.clone(),
            None => {
                let sha = store.script_load(self.source).await?;
                let _ = self.sha.set(sha.clone());
                sha
            }
        };

        match store.eval_sha(&sha, keys, args).await {
            Err(err) if err.is_noscript() => store.eval(self.source, keys, args).await,
            other => other,
        }
    }
}

/// Interpret the `[allowed, remaining, third]` integer array every decision
/// script replies with. The third element's meaning is per-algorithm.
pub(crate) fn decision_reply(reply: Vec<i64>) -> Result<(bool, i64, i64), FlowgateError> {
    match reply.as_slice() {
        [allowed, remaining, third, ..] => Ok((*allowed == 1, *remaining, *third)),
        _ => Err(FlowgateError::BadReply(format!(
            "decision script replied with {} integers, expected 3",
            reply.len()
        ))),
    }
}

pub(crate) fn unix_now_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub(crate) fn unix_now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub(crate) fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
