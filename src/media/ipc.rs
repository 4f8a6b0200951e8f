//! Playback engine control socket
//!
//! mpv speaks newline-delimited JSON over a Unix socket. Every exchange here
//! opens a fresh connection, sends one command and waits for its reply,
//! skipping any unsolicited event lines. The whole exchange is bounded by a
//! short deadline so a wedged engine cannot stall the caller.

use serde::Deserialize;
use serde_json::{Value, json};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("control socket unavailable: {0}")]
    Connect(#[source] io::Error),

    #[error("control exchange exceeded {0:?}")]
    Timeout(Duration),

    #[error("control socket closed before replying")]
    Closed,

    #[error("player rejected command: {0}")]
    Rejected(String),

    #[error("reply carried no usable data")]
    MissingData,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    event: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ControlChannel {
    socket: PathBuf,
    deadline: Duration,
}

impl ControlChannel {
    pub fn new(socket: impl Into<PathBuf>, deadline: Duration) -> Self {
        Self {
            socket: socket.into(),
            deadline,
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Whether the engine has created its socket
    pub fn is_present(&self) -> bool {
        self.socket.exists()
    }

    /// Display `text` on the OSD for `duration_ms` at the given OSD level
    pub async fn show_text(&self, text: &str, duration_ms: u64, level: u8) -> Result<(), IpcError> {
        self.request(json!({ "command": ["show-text", text, duration_ms, level] }))
            .await
            .map(|_| ())
    }

    /// Seconds left in the current media
    pub async fn time_remaining(&self) -> Result<f64, IpcError> {
        let data = self
            .request(json!({ "command": ["get_property", "time-remaining"] }))
            .await?;
        data.as_f64().ok_or(IpcError::MissingData)
    }

    pub async fn request(&self, command: Value) -> Result<Value, IpcError> {
        timeout(self.deadline, self.exchange(command))
            .await
            .map_err(|_| IpcError::Timeout(self.deadline))?
    }

    async fn exchange(&self, command: Value) -> Result<Value, IpcError> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(IpcError::Connect)?;
        let (read, mut write) = stream.into_split();

        let mut payload = serde_json::to_vec(&command)?;
        payload.push(b'\n');
        write.write_all(&payload).await?;

        let mut lines = BufReader::new(read).lines();
        while let Some(line) = lines.next_line().await? {
            let Ok(reply) = serde_json::from_str::<Reply>(&line) else {
                continue;
            };
            if reply.event.is_some() {
                continue;
            }
            let Some(error) = reply.error else {
                continue;
            };
            if error != "success" {
                return Err(IpcError::Rejected(error));
            }
            return Ok(reply.data.unwrap_or(Value::Null));
        }

        Err(IpcError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::net::UnixListener;
    use tokio::sync::oneshot;

    /// One-shot fake engine: accepts a connection, records the command line,
    /// then writes `replies` verbatim
    fn fake_engine(
        listener: UnixListener,
        replies: &'static [&'static str],
    ) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let command = lines.next_line().await.unwrap().unwrap();
            let _ = tx.send(command);
            for reply in replies {
                write.write_all(reply.as_bytes()).await.unwrap();
                write.write_all(b"\n").await.unwrap();
            }
            // hold the connection open until the client hangs up
            let _ = lines.next_line().await;
        });
        rx
    }

    fn channel(dir: &TempDir) -> (ControlChannel, UnixListener) {
        let path = dir.path().join("ctl.sock");
        let listener = UnixListener::bind(&path).unwrap();
        (ControlChannel::new(path, Duration::from_millis(500)), listener)
    }

    #[tokio::test]
    async fn test_time_remaining_skips_events() {
        let dir = TempDir::new().unwrap();
        let (ctl, listener) = channel(&dir);
        let sent = fake_engine(
            listener,
            &[
                r#"{"event":"playback-restart"}"#,
                r#"{"data":83.4,"error":"success","request_id":0}"#,
            ],
        );

        assert_eq!(ctl.time_remaining().await.unwrap(), 83.4);

        let command: Value = serde_json::from_str(&sent.await.unwrap()).unwrap();
        assert_eq!(command, json!({ "command": ["get_property", "time-remaining"] }));
    }

    #[tokio::test]
    async fn test_show_text_escapes_payload() {
        let dir = TempDir::new().unwrap();
        let (ctl, listener) = channel(&dir);
        let sent = fake_engine(listener, &[r#"{"data":null,"error":"success"}"#]);

        ctl.show_text("UP NEXT: \"Bob\" (Song)", 6000, 3).await.unwrap();

        let command: Value = serde_json::from_str(&sent.await.unwrap()).unwrap();
        assert_eq!(
            command,
            json!({ "command": ["show-text", "UP NEXT: \"Bob\" (Song)", 6000, 3] })
        );
    }

    #[tokio::test]
    async fn test_rejected_property() {
        let dir = TempDir::new().unwrap();
        let (ctl, listener) = channel(&dir);
        let _sent = fake_engine(listener, &[r#"{"error":"property unavailable"}"#]);

        let err = ctl.time_remaining().await.unwrap_err();
        assert!(matches!(err, IpcError::Rejected(ref e) if e == "property unavailable"));
    }

    #[tokio::test]
    async fn test_silent_engine_times_out() {
        let dir = TempDir::new().unwrap();
        let (ctl, listener) = channel(&dir);
        let _sent = fake_engine(listener, &[]);

        let err = ctl.time_remaining().await.unwrap_err();
        assert!(matches!(err, IpcError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_socket() {
        let dir = TempDir::new().unwrap();
        let ctl = ControlChannel::new(dir.path().join("absent.sock"), Duration::from_millis(200));

        assert!(!ctl.is_present());
        assert!(matches!(ctl.time_remaining().await, Err(IpcError::Connect(_))));
    }
}
