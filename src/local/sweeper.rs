use std::{
    sync::{Arc, Weak},
    thread,
    time::Duration,
};

use dashmap::DashMap;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Start the background eviction thread for an engine's state map.
///
/// The thread holds only a [`Weak`] handle, wakes once per second, and drops
/// every entry for which `expired` returns true. It exits on its own when the
/// owning engine is dropped.
pub(crate) fn spawn_sweeper<S, F>(states: &Arc<DashMap<String, S>>, expired: F)
where
    S: Send + Sync + 'static,
    F: Fn(&S) -> bool + Send + 'static,
{
    let states: Weak<DashMap<String, S>> = Arc::downgrade(states);

    let _ = thread::Builder::new()
        .name("flowgate-sweeper".to_string())
        .spawn(move || {
            loop {
                thread::sleep(SWEEP_INTERVAL);
                let Some(states) = states.upgrade() else {
                    break;
                };
                states.retain(|_, state| !expired(state));
            }
        });
}
