//! External media tools
//!
//! - [`retrieval`] - the retrieval tool (yt-dlp): filename prediction,
//!   streamed downloads and search-only mode
//! - [`player`] - the playback engine (mpv) launcher
//! - [`ipc`] - the playback engine's JSON control socket

pub mod ipc;
pub mod player;
pub mod retrieval;

pub use ipc::{ControlChannel, IpcError};
pub use player::{Launcher, Mpv};
pub use retrieval::{Retriever, YtDlp};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with code {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} output pipe unavailable")]
    MissingPipe { tool: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
