use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server and on-disk locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Host shown in the "Join" overlay; detected from the network when unset
    #[serde(default)]
    pub public_host: Option<String>,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_host: None,
            db_path: default_db_path(),
            download_dir: default_download_dir(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_db_path() -> PathBuf {
    PathBuf::from("karaokebox.db")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

/// Retrieval tool (yt-dlp) invocation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_binary")]
    pub binary: String,
    /// Format selector handed to `-f`; caps quality for low-power hardware
    #[serde(default = "default_format")]
    pub format: String,
    /// Cookie jar passed with `--cookies`, only when the file exists
    #[serde(default = "default_cookies_file")]
    pub cookies_file: PathBuf,
    #[serde(default = "default_js_runtime")]
    pub js_runtime: Option<String>,
    /// Number of results requested in search-only mode
    #[serde(default = "default_search_results")]
    pub search_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            binary: default_retrieval_binary(),
            format: default_format(),
            cookies_file: default_cookies_file(),
            js_runtime: default_js_runtime(),
            search_results: default_search_results(),
        }
    }
}

fn default_retrieval_binary() -> String {
    "yt-dlp".to_string()
}

fn default_format() -> String {
    "best[height<=480]/bestvideo[height<=480]+bestaudio/best".to_string()
}

fn default_cookies_file() -> PathBuf {
    PathBuf::from("cookies.txt")
}

fn default_js_runtime() -> Option<String> {
    Some("node".to_string())
}

fn default_search_results() -> usize {
    5
}

/// Playback engine (mpv) launch options
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_binary")]
    pub binary: String,
    #[serde(default = "default_ipc_socket")]
    pub ipc_socket: PathBuf,
    /// X display the player renders on
    #[serde(default = "default_display")]
    pub display: Option<String>,
    #[serde(default = "default_video_output")]
    pub video_output: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_osd_font_size")]
    pub osd_font_size: u32,
    #[serde(default = "default_osd_color")]
    pub osd_color: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: default_player_binary(),
            ipc_socket: default_ipc_socket(),
            display: default_display(),
            video_output: default_video_output(),
            profile: default_profile(),
            osd_font_size: default_osd_font_size(),
            osd_color: default_osd_color(),
        }
    }
}

fn default_player_binary() -> String {
    "mpv".to_string()
}

fn default_ipc_socket() -> PathBuf {
    PathBuf::from("/tmp/karaokebox.sock")
}

fn default_display() -> Option<String> {
    Some(":0".to_string())
}

fn default_video_output() -> String {
    "x11".to_string()
}

fn default_profile() -> String {
    "sw-fast".to_string()
}

fn default_osd_font_size() -> u32 {
    25
}

fn default_osd_color() -> String {
    "#FFFF00".to_string()
}

/// Remote search providers and the race deadline
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Invidious-compatible `/api/v1/search` endpoints, raced in parallel
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Appended to queries that do not mention it already
    #[serde(default = "default_keyword")]
    pub keyword: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            deadline_ms: default_deadline_ms(),
            keyword: default_keyword(),
            max_results: default_max_results(),
        }
    }
}

impl SearchConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

fn default_providers() -> Vec<String> {
    [
        "https://invidious.jing.rocks/api/v1/search",
        "https://invidious.nerdvpn.de/api/v1/search",
        "https://inv.zzls.xyz/api/v1/search",
        "https://invidious.io.lol/api/v1/search",
        "https://invidious.private.coffee/api/v1/search",
        "https://iv.ggtyler.dev/api/v1/search",
        "https://invidious.fdn.fr/api/v1/search",
        "https://invidious.perennialteks.com/api/v1/search",
        "https://yt.artemislena.eu/api/v1/search",
        "https://invidious.projectsegfau.lt/api/v1/search",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_deadline_ms() -> u64 {
    3000
}

fn default_keyword() -> String {
    "karaoke".to_string()
}

fn default_max_results() -> usize {
    10
}

/// Poll intervals and pauses of the long-running workers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_download_poll_ms")]
    pub download_poll_ms: u64,
    #[serde(default = "default_playback_poll_ms")]
    pub playback_poll_ms: u64,
    /// Pause between songs so the idle screen can show the join prompt
    #[serde(default = "default_playback_gap_ms")]
    pub playback_gap_ms: u64,
    #[serde(default = "default_osd_interval_ms")]
    pub osd_interval_ms: u64,
    #[serde(default = "default_osd_duration_ms")]
    pub osd_duration_ms: u64,
    #[serde(default = "default_osd_level")]
    pub osd_level: u8,
    #[serde(default = "default_control_deadline_ms")]
    pub control_deadline_ms: u64,
    #[serde(default = "default_library_scan_interval_secs")]
    pub library_scan_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            download_poll_ms: default_download_poll_ms(),
            playback_poll_ms: default_playback_poll_ms(),
            playback_gap_ms: default_playback_gap_ms(),
            osd_interval_ms: default_osd_interval_ms(),
            osd_duration_ms: default_osd_duration_ms(),
            osd_level: default_osd_level(),
            control_deadline_ms: default_control_deadline_ms(),
            library_scan_interval_secs: default_library_scan_interval_secs(),
        }
    }
}

impl WorkerConfig {
    pub fn download_poll(&self) -> Duration {
        Duration::from_millis(self.download_poll_ms)
    }

    pub fn playback_poll(&self) -> Duration {
        Duration::from_millis(self.playback_poll_ms)
    }

    pub fn playback_gap(&self) -> Duration {
        Duration::from_millis(self.playback_gap_ms)
    }

    pub fn osd_interval(&self) -> Duration {
        Duration::from_millis(self.osd_interval_ms)
    }

    pub fn control_deadline(&self) -> Duration {
        Duration::from_millis(self.control_deadline_ms)
    }

    pub fn library_scan_interval(&self) -> Duration {
        Duration::from_secs(self.library_scan_interval_secs)
    }
}

fn default_download_poll_ms() -> u64 {
    2000
}

fn default_playback_poll_ms() -> u64 {
    1000
}

fn default_playback_gap_ms() -> u64 {
    5000
}

fn default_osd_interval_ms() -> u64 {
    5000
}

fn default_osd_duration_ms() -> u64 {
    6000
}

fn default_osd_level() -> u8 {
    3
}

fn default_control_deadline_ms() -> u64 {
    200
}

fn default_library_scan_interval_secs() -> u64 {
    600
}

/// Log output
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Optional log file, rotated once it grows past `max_bytes`
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: ByteSize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            file: None,
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

fn default_max_bytes() -> ByteSize {
    ByteSize(1024 * 1024) // 1 MB
}
