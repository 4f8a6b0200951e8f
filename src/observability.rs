//! Logging setup and in-process counters

use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Install the global subscriber: stderr always, plus a size-capped file
/// when `logging.file` is set
///
/// `RUST_LOG` overrides the configured filter.
pub fn init_logging(config: &LoggingConfig) -> Result<(), AnyError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))?;

    let file_layer = match &config.file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(RotatingFile::open(path, config.max_bytes.as_u64())?),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Append-only log file that keeps one previous generation
///
/// Once the file reaches `max_bytes` it is renamed to `<file>.old`
/// (replacing any older one) and a fresh file is started.
#[derive(Debug, Clone)]
pub struct RotatingFile {
    inner: Arc<Mutex<RotationState>>,
}

#[derive(Debug)]
struct RotationState {
    path: PathBuf,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            inner: Arc::new(Mutex::new(RotationState {
                path,
                max_bytes,
                file,
                written,
            })),
        })
    }

    pub fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".old");
        PathBuf::from(name)
    }
}

impl RotationState {
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let backup = RotatingFile::backup_path(&self.path);
        match fs::remove_file(&backup) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::rename(&self.path, &backup)?;
        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        if state.written >= state.max_bytes {
            state.rotate()?;
        }
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        state.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Event counters reported by `/health`
#[derive(Debug, Default)]
pub struct Counters {
    jobs_enqueued: AtomicU64,
    cache_hits: AtomicU64,
    downloads_completed: AtomicU64,
    downloads_failed: AtomicU64,
    songs_played: AtomicU64,
    playbacks_failed: AtomicU64,
    skips: AtomicU64,
    searches_fast: AtomicU64,
    searches_fallback: AtomicU64,
    searches_failed: AtomicU64,
}

macro_rules! counter {
    ($($method:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $method(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(counter = stringify!($field), "Counter incremented");
            }
        )*
    };
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        job_enqueued => jobs_enqueued,
        cache_hit => cache_hits,
        download_completed => downloads_completed,
        download_failed => downloads_failed,
        song_played => songs_played,
        playback_failed => playbacks_failed,
        skipped => skips,
        search_fast => searches_fast,
        search_fallback => searches_fallback,
        search_failed => searches_failed,
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            downloads_failed: self.downloads_failed.load(Ordering::Relaxed),
            songs_played: self.songs_played.load(Ordering::Relaxed),
            playbacks_failed: self.playbacks_failed.load(Ordering::Relaxed),
            skips: self.skips.load(Ordering::Relaxed),
            searches_fast: self.searches_fast.load(Ordering::Relaxed),
            searches_fallback: self.searches_fallback.load(Ordering::Relaxed),
            searches_failed: self.searches_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub jobs_enqueued: u64,
    pub cache_hits: u64,
    pub downloads_completed: u64,
    pub downloads_failed: u64,
    pub songs_played: u64,
    pub playbacks_failed: u64,
    pub skips: u64,
    pub searches_fast: u64,
    pub searches_fallback: u64,
    pub searches_failed: u64,
}
