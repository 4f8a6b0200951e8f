//! Handle on the running playback engine

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::info;

#[derive(Debug)]
struct ActivePlayback {
    job_id: i64,
    pid: Option<u32>,
    stop: oneshot::Sender<()>,
}

/// Shared between the playback worker (publish/clear) and the HTTP layer
/// (skip). The lock is only ever held for a field swap.
#[derive(Debug, Default)]
pub struct NowPlaying {
    slot: Mutex<Option<ActivePlayback>>,
}

impl NowPlaying {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActivePlayback>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a freshly spawned engine; the receiver fires on skip
    pub fn publish(&self, job_id: i64, pid: Option<u32>) -> oneshot::Receiver<()> {
        let (stop, stopped) = oneshot::channel();
        *self.lock() = Some(ActivePlayback { job_id, pid, stop });
        stopped
    }

    /// Forget `job_id` if it is still the published one
    pub fn clear(&self, job_id: i64) {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|active| active.job_id == job_id) {
            *slot = None;
        }
    }

    /// Ask the playing engine to stop; false when nothing plays
    pub fn skip(&self) -> bool {
        let Some(active) = self.lock().take() else {
            return false;
        };
        info!(job_id = active.job_id, pid = ?active.pid, "Skipping current song");
        // the worker may have just seen the engine exit on its own
        let _ = active.stop.send(());
        true
    }

    pub fn current(&self) -> Option<i64> {
        self.lock().as_ref().map(|active| active.job_id)
    }
}
