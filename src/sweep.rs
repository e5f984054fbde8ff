//! Scheduled background sweeps.
//!
//! Three periodic tasks keep the system converging without any caller
//! traffic:
//!
//! - pending sweep: re-polls every pending operation so results are
//!   collected even when no client is polling;
//! - pool scan: rebuilds the long-lived pool index from disk, picking up
//!   files placed there out of band;
//! - local refresh: rescans the local provider's source directory.
//!
//! Each sweep runs on its own tokio interval and is aborted when its
//! [`SweepHandle`] drops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::manager::OperationManager;
use crate::pool::FilePool;
use crate::providers::LocalPoolProvider;

/// Abort-on-drop handle to one background sweep.
#[derive(Debug)]
pub struct SweepHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl SweepHandle {
    /// The sweep's name, for logging.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the sweep now instead of waiting for the handle to drop.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        debug!(sweep = self.name, "stopping sweep");
        self.handle.abort();
    }
}

fn spawn_every<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> SweepHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    debug!(sweep = name, period_secs = period.as_secs(), "starting sweep");
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // Missed ticks (long sweep bodies) are coalesced, not replayed.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // immediate first tick
        loop {
            interval.tick().await;
            tick().await;
        }
    });
    SweepHandle { name, handle }
}

/// Re-poll all pending operations every `period`.
pub fn check_pending(manager: Arc<OperationManager>, period: Duration) -> SweepHandle {
    spawn_every("check-pending", period, move || {
        let manager = Arc::clone(&manager);
        async move {
            manager.check_pending().await;
        }
    })
}

/// Rescan `pool` from disk every `period`.
pub fn scan_pool(pool: Arc<FilePool>, period: Duration) -> SweepHandle {
    spawn_every("scan-pool", period, move || {
        let pool = Arc::clone(&pool);
        async move {
            if let Err(err) = pool.scan() {
                warn!(dir = %pool.dir().display(), error = %err, "pool scan failed");
            }
        }
    })
}

/// Rescan the local provider's source directory every `period`.
pub fn refresh_local(provider: Arc<LocalPoolProvider>, period: Duration) -> SweepHandle {
    spawn_every("refresh-local", period, move || {
        let provider = Arc::clone(&provider);
        async move {
            if let Err(err) = provider.refresh() {
                warn!(error = %err, "local pool refresh failed");
            }
        }
    })
}
