//! On-screen "Join" and "UP NEXT" overlay

use std::net::{IpAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::media::ControlChannel;
use crate::queue::{Job, JobStatus, JobStore, StoreError};

/// Pushes the "UP NEXT" part to the far side of the OSD line
const SPACER_WIDTH: usize = 34;

/// Host shown to guests: the configured one, else the detected LAN address
pub fn advertised_host(config: &Config) -> String {
    config
        .server
        .public_host
        .clone()
        .filter(|host| !host.trim().is_empty())
        .or_else(|| detect_local_ip().map(|ip| ip.to_string()))
        .unwrap_or_else(|| "Unknown".to_string())
}

/// First non-loopback IPv4 address of this machine
///
/// Connecting a UDP socket only selects a route; no packet leaves the host.
pub fn detect_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (ip.is_ipv4() && !ip.is_loopback() && !ip.is_unspecified()).then_some(ip)
}

pub fn compose_overlay(join_url: &str, next: Option<&Job>) -> String {
    match next {
        Some(job) => format!(
            "Join: {join_url}{}UP NEXT: {} ({})",
            " ".repeat(SPACER_WIDTH),
            job.singer,
            job.title
        ),
        None => format!("Join: {join_url}"),
    }
}

pub struct OsdNotifier {
    store: Arc<JobStore>,
    control: ControlChannel,
    join_url: String,
    interval: Duration,
    duration_ms: u64,
    level: u8,
}

impl OsdNotifier {
    pub fn new(store: Arc<JobStore>, control: ControlChannel, config: &Config) -> Self {
        Self {
            store,
            control,
            join_url: format!("http://{}:{}", advertised_host(config), config.public_port()),
            interval: config.workers.osd_interval(),
            duration_ms: config.workers.osd_duration_ms,
            level: config.workers.osd_level,
        }
    }

    pub fn join_url(&self) -> &str {
        &self.join_url
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(join_url = %self.join_url, "OSD notifier started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.tick().await {
                error!(error = %e, "OSD update failed");
            }
        }
        info!("OSD notifier stopped");
    }

    /// Send one overlay; false when no player was listening
    pub async fn tick(&self) -> Result<bool, StoreError> {
        if !self.control.is_present() {
            return Ok(false);
        }

        let next = self.store.peek_oldest(JobStatus::Ready)?;
        let text = compose_overlay(&self.join_url, next.as_ref());

        match self.control.show_text(&text, self.duration_ms, self.level).await {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(error = %e, "OSD update skipped");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixListener;

    fn job(singer: &str, title: &str) -> Job {
        Job {
            id: 1,
            url: "https://yt/v1".to_string(),
            status: JobStatus::Ready,
            title: title.to_string(),
            singer: singer.to_string(),
            filename: "x.mp4".to_string(),
            progress: None,
            time_left: None,
        }
    }

    #[test]
    fn test_compose_overlay() {
        let url = "http://192.168.1.20:8080";
        assert_eq!(compose_overlay(url, None), "Join: http://192.168.1.20:8080");

        let text = compose_overlay(url, Some(&job("Ana", "Dancing Queen")));
        assert!(text.starts_with("Join: http://192.168.1.20:8080   "));
        assert!(text.ends_with("UP NEXT: Ana (Dancing Queen)"));
        assert_eq!(
            text.len(),
            "Join: http://192.168.1.20:8080".len()
                + SPACER_WIDTH
                + "UP NEXT: Ana (Dancing Queen)".len()
        );
    }

    #[test]
    fn test_configured_host_wins() {
        let mut config = Config::default();
        config.server.public_host = Some("karaoke.local".to_string());
        assert_eq!(advertised_host(&config), "karaoke.local");
    }

    fn notifier(dir: &TempDir, store: Arc<JobStore>) -> OsdNotifier {
        let mut config = Config::default();
        config.server.public_host = Some("10.0.0.5".to_string());
        let control = ControlChannel::new(dir.path().join("ctl.sock"), Duration::from_millis(500));
        OsdNotifier::new(store, control, &config)
    }

    #[tokio::test]
    async fn test_tick_without_player_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JobStore::open_in_memory(dir.path()).unwrap());
        let osd = notifier(&dir, store);

        assert_eq!(osd.join_url(), "http://10.0.0.5:8080");
        assert!(!osd.tick().await.unwrap());
    }

    #[tokio::test]
    async fn test_tick_announces_next_ready_job() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JobStore::open_in_memory(dir.path()).unwrap());
        std::fs::write(dir.path().join("Song.mp4"), b"video").unwrap();
        store.adopt_file("Song.mp4", "Song").unwrap();
        store.enqueue("local_file", "Song", "Ana").unwrap();

        let listener = UnixListener::bind(dir.path().join("ctl.sock")).unwrap();
        let engine = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let command = lines.next_line().await.unwrap().unwrap();
            write
                .write_all(b"{\"data\":null,\"error\":\"success\"}\n")
                .await
                .unwrap();
            command
        });

        let osd = notifier(&dir, store);
        assert!(osd.tick().await.unwrap());

        let command: Value = serde_json::from_str(&engine.await.unwrap()).unwrap();
        let args = command["command"].as_array().unwrap();
        assert_eq!(args[0], "show-text");
        let text = args[1].as_str().unwrap();
        assert!(text.starts_with("Join: http://10.0.0.5:8080"));
        assert!(text.ends_with("UP NEXT: Ana (Song)"));
        assert_eq!(args[2], 6000);
        assert_eq!(args[3], 3);
    }
}
