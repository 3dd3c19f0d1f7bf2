//! In-process engine variants.
//!
//! Each engine owns its per-key state in a [`DashMap`](dashmap::DashMap) and
//! decides while holding the entry's shard guard, so concurrent calls for one
//! key serialize and the produced decisions match a single-threaded execution
//! in some order.
//!
//! State is process-scoped: nothing is shared across processes and nothing
//! survives a restart. Entries materialize on first request and are evicted
//! by a background sweeper once their algorithm's horizon has passed.

mod sweeper;
pub(crate) use sweeper::spawn_sweeper;

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
