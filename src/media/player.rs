//! Playback engine (mpv) launcher

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::ToolError;
use crate::config::PlayerConfig;

/// Starts the playback engine on a media file
///
/// The returned child is owned by the caller; dropping it kills the engine.
pub trait Launcher: Send + Sync {
    /// Called once before the first launch
    fn prepare(&self) {}

    fn launch(&self, media: &Path) -> Result<Child, ToolError>;
}

#[derive(Debug, Clone)]
pub struct Mpv {
    binary: String,
    ipc_socket: PathBuf,
    display: Option<String>,
    video_output: String,
    profile: String,
    osd_font_size: u32,
    osd_color: String,
    osd_level: u8,
}

impl Mpv {
    pub fn new(config: &PlayerConfig, osd_level: u8) -> Self {
        Self {
            binary: config.binary.clone(),
            ipc_socket: config.ipc_socket.clone(),
            display: config.display.clone().filter(|d| !d.trim().is_empty()),
            video_output: config.video_output.clone(),
            profile: config.profile.clone(),
            osd_font_size: config.osd_font_size,
            osd_color: config.osd_color.clone(),
            osd_level,
        }
    }

    pub fn ipc_socket(&self) -> &Path {
        &self.ipc_socket
    }

    /// Fullscreen, borderless, on top, OSD in the bottom-right corner
    pub fn args(&self, media: &Path) -> Vec<OsString> {
        let mut ipc = OsString::from("--input-ipc-server=");
        ipc.push(&self.ipc_socket);

        let mut args: Vec<OsString> = vec![
            "--fs".into(),
            "--ontop".into(),
            "--no-border".into(),
            ipc,
            "--osd-align-y=bottom".into(),
            "--osd-align-x=right".into(),
            "--osd-margin-y=20".into(),
            "--osd-margin-x=20".into(),
            format!("--osd-font-size={}", self.osd_font_size).into(),
            format!("--osd-color={}", self.osd_color).into(),
            format!("--osd-level={}", self.osd_level).into(),
            format!("--profile={}", self.profile).into(),
            format!("--vo={}", self.video_output).into(),
            "--framedrop=vo".into(),
            "--video-sync=desync".into(),
        ];
        // titles may start with '-'
        args.push("--".into());
        args.push(media.as_os_str().to_owned());
        args
    }

    /// Remove a socket left behind by a previous engine instance
    fn clear_stale_socket(&self) {
        match std::fs::remove_file(&self.ipc_socket) {
            Ok(()) => debug!(socket = %self.ipc_socket.display(), "Removed stale control socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(socket = %self.ipc_socket.display(), error = %e, "Could not remove control socket"),
        }
    }
}

impl Launcher for Mpv {
    fn prepare(&self) {
        self.clear_stale_socket();
    }

    fn launch(&self, media: &Path) -> Result<Child, ToolError> {
        self.clear_stale_socket();

        let mut command = Command::new(&self.binary);
        command
            .args(self.args(media))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(display) = &self.display {
            command.env("DISPLAY", display);
        }

        info!(binary = %self.binary, media = %media.display(), "Launching player");
        command.spawn().map_err(|source| ToolError::Spawn {
            tool: self.binary.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_end_with_media_after_separator() {
        let mpv = Mpv::new(&PlayerConfig::default(), 3);
        let args = mpv.args(Path::new("/srv/downloads/-weird title.mp4"));

        let n = args.len();
        assert_eq!(args[n - 2], "--");
        assert_eq!(args[n - 1], "/srv/downloads/-weird title.mp4");
        assert!(args.contains(&OsString::from("--input-ipc-server=/tmp/karaokebox.sock")));
        assert!(args.contains(&OsString::from("--osd-font-size=25")));
        assert!(args.contains(&OsString::from("--osd-color=#FFFF00")));
        assert!(args.contains(&OsString::from("--osd-level=3")));
        assert!(args.contains(&OsString::from("--vo=x11")));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = PlayerConfig {
            binary: "/nonexistent/mpv".to_string(),
            ipc_socket: dir.path().join("ctl.sock"),
            ..PlayerConfig::default()
        };
        let mpv = Mpv::new(&config, 3);

        let err = mpv.launch(Path::new("song.mp4")).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_launch_clears_stale_socket() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket = dir.path().join("ctl.sock");
        std::fs::write(&socket, b"").unwrap();

        let config = PlayerConfig {
            binary: "/nonexistent/mpv".to_string(),
            ipc_socket: socket.clone(),
            ..PlayerConfig::default()
        };
        let _ = Mpv::new(&config, 3).launch(Path::new("song.mp4"));
        assert!(!socket.exists());
    }
}
