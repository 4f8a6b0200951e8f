//! Playback worker: `ready -> playing -> played`

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::now_playing::NowPlaying;
use crate::media::Launcher;
use crate::observability::Counters;
use crate::queue::{JobStatus, JobStore, JobUpdate, StoreError};

/// What one claim attempt amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Idle,
    Played,
    Failed,
}

pub struct PlaybackWorker {
    store: Arc<JobStore>,
    launcher: Arc<dyn Launcher>,
    now_playing: Arc<NowPlaying>,
    counters: Arc<Counters>,
    poll: Duration,
    gap: Duration,
}

impl PlaybackWorker {
    pub fn new(
        store: Arc<JobStore>,
        launcher: Arc<dyn Launcher>,
        now_playing: Arc<NowPlaying>,
        counters: Arc<Counters>,
        poll: Duration,
        gap: Duration,
    ) -> Self {
        Self {
            store,
            launcher,
            now_playing,
            counters,
            poll,
            gap,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Playback worker started");
        self.launcher.prepare();

        loop {
            if *shutdown.borrow() {
                break;
            }
            let pause = match self.play_next(&mut shutdown).await {
                Ok(Turn::Played) => self.gap,
                Ok(Turn::Failed) => Duration::ZERO,
                Ok(Turn::Idle) => self.poll,
                Err(e) => {
                    error!(error = %e, "Playback iteration failed");
                    self.poll
                }
            };
            if !pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        info!("Playback worker stopped");
    }

    /// Claim the oldest ready job and play it to the end
    pub async fn play_next(&self, shutdown: &mut watch::Receiver<bool>) -> Result<Turn, StoreError> {
        let Some(job) = self.store.claim_oldest(JobStatus::Ready, JobStatus::Playing)? else {
            return Ok(Turn::Idle);
        };

        let path = self.store.download_dir().join(&job.filename);
        if job.filename.is_empty() || !path.is_file() {
            warn!(job_id = job.id, path = %path.display(), "Media file missing");
            return self.fail(job.id);
        }

        let mut child = match self.launcher.launch(&path) {
            Ok(child) => child,
            Err(e) => {
                error!(job_id = job.id, error = %e, "Player failed to start");
                return self.fail(job.id);
            }
        };

        let stop = self.now_playing.publish(job.id, child.id());
        info!(job_id = job.id, singer = %job.singer, title = %job.title, "Now playing");

        let interrupted = tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => debug!(job_id = job.id, %status, "Player exited"),
                    Err(e) => warn!(job_id = job.id, error = %e, "Lost track of player"),
                }
                false
            }
            Ok(()) = stop => true,
            Ok(()) = shutdown.changed() => true,
        };
        if interrupted {
            if let Err(e) = child.kill().await {
                warn!(job_id = job.id, error = %e, "Could not stop player");
            }
        }
        self.now_playing.clear(job.id);

        if !self.store.transition(job.id, JobUpdate::status(JobStatus::Played))? {
            debug!(job_id = job.id, "Job deleted while playing");
        }
        self.counters.song_played();
        Ok(Turn::Played)
    }

    fn fail(&self, job_id: i64) -> Result<Turn, StoreError> {
        self.counters.playback_failed();
        self.store
            .transition(job_id, JobUpdate::status(JobStatus::Failed))?;
        Ok(Turn::Failed)
    }
}
