//! Flowgate is a set of rate limiting primitives: six algorithms, each
//! available in-process or backed by a shared store, all answering through
//! one uniform [`Decision`] record.
//!
//! The crate focuses on:
//! - concurrency safety (per-key linearizable decisions)
//! - identical numerics between the in-process and store-backed variants
//! - predictable behavior when the backend misbehaves (fail-open/closed)
//!
//! # Algorithms
//!
//! - Fixed window counter: cheap fixed intervals, boundary burst allowed
//! - Sliding window log: exact, one timestamp per accepted request
//! - Sliding window counter: weighted approximation, O(1) memory
//! - Token bucket: steady refill, burst-friendly
//! - Leaky bucket: constant drain, policing or shaping mode
//! - GCRA: virtual scheduling with sustained rate plus burst
//!
//! # Quick start
//!
//! ```rust
//! use flowgate::{Options, fixed_window};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let limiter = fixed_window(100, 60, Options::default()).unwrap();
//!
//! let decision = limiter.allow("user:123").await.unwrap();
//! if decision.allowed {
//!     // proceed
//! } else {
//!     // reject, telling the caller to wait decision.retry_after
//! }
//! # }
//! ```
//!
//! # Distributed mode
//!
//! Configure a store and the same constructors return engines whose
//! decisions run as atomic server-side scripts, shared by every process
//! pointing at that backend:
//!
//! ```no_run
//! # async fn distributed(manager: redis::aio::ConnectionManager) {
//! use flowgate::{Options, token_bucket};
//!
//! let limiter = token_bucket(100, 10, Options::default().with_redis(manager)).unwrap();
//! # }
//! ```

mod error;
pub use error::FlowgateError;

mod limiter;
pub use limiter::*;

mod options;
pub use options::{LimitFn, Options};

mod builder;
pub use builder::Builder;

mod cache;
pub use cache::{CacheOptions, CacheStats, CachedLimiter};

pub mod store;

mod local;

mod distributed;

#[cfg(test)]
mod tests;
