//! Background workers
//!
//! Three long-lived loops share the job store and nothing else:
//! - [`download::DownloadWorker`] turns `pending` jobs into files
//! - [`playback::PlaybackWorker`] plays `ready` jobs one at a time
//! - [`osd::OsdNotifier`] keeps the join address and next singer on screen
//!
//! A fourth loop periodically adopts media files dropped into the download
//! directory by hand. All of them stop when the shutdown channel flips.

pub mod download;
pub mod now_playing;
pub mod osd;
pub mod playback;
pub mod progress;

pub use download::DownloadWorker;
pub use now_playing::NowPlaying;
pub use osd::OsdNotifier;
pub use playback::PlaybackWorker;
pub use progress::{ProgressBoard, ProgressParser};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::Config;
use crate::media::{ControlChannel, Launcher, Retriever};
use crate::observability::Counters;
use crate::queue::JobStore;
use crate::queue::library::sync_library;

/// Shared handles the workers are built from
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<JobStore>,
    pub retriever: Arc<dyn Retriever>,
    pub launcher: Arc<dyn Launcher>,
    pub control: ControlChannel,
    pub progress: Arc<ProgressBoard>,
    pub now_playing: Arc<NowPlaying>,
    pub counters: Arc<Counters>,
}

/// Running worker tasks
pub struct Workers {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    pub fn spawn(config: &Config, deps: WorkerDeps) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let workers = &config.workers;

        let download = DownloadWorker::new(
            Arc::clone(&deps.store),
            deps.retriever,
            deps.progress,
            Arc::clone(&deps.counters),
            workers.download_poll(),
        );
        let playback = PlaybackWorker::new(
            Arc::clone(&deps.store),
            deps.launcher,
            deps.now_playing,
            deps.counters,
            workers.playback_poll(),
            workers.playback_gap(),
        );
        let osd = OsdNotifier::new(Arc::clone(&deps.store), deps.control, config);

        let handles = vec![
            tokio::spawn(download.run(rx.clone())),
            tokio::spawn(playback.run(rx.clone())),
            tokio::spawn(osd.run(rx.clone())),
            tokio::spawn(library_scan(
                deps.store,
                workers.library_scan_interval(),
                rx,
            )),
        ];

        Self { shutdown, handles }
    }

    /// Signal every loop and wait for them to return
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Workers stopped");
    }
}

/// Periodically adopt orphan files
async fn library_scan(store: Arc<JobStore>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick is immediate; bootstrap already scanned
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
        match sync_library(&store) {
            Ok(0) => {}
            Ok(adopted) => info!(adopted, "Library scan adopted new files"),
            Err(e) => error!(error = %e, "Library scan failed"),
        }
    }
}
