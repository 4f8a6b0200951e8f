//! Download directory reconciliation
//!
//! Files copied into the download directory by hand become playable history:
//! any media file no job row points at is adopted as a `played` job sung by
//! "System".

use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

use super::error::Result;
use super::models::JobStatus;
use super::store::JobStore;

/// Extensions picked up by the library scan
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv"];

pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MEDIA_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Title shown for a file: its name without the extension
pub fn title_from_filename(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename)
        .to_string()
}

/// Intermediate output of the retrieval tool: format streams awaiting a
/// merge (`Song.f134.mp4`) and the merger's scratch file (`Song.temp.mp4`)
pub fn is_partial_download(filename: &str) -> bool {
    let stem = title_from_filename(filename);
    let Some((_, suffix)) = stem.rsplit_once('.') else {
        return false;
    };
    if suffix == "temp" {
        return true;
    }
    suffix
        .strip_prefix('f')
        .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
}

/// Adopt orphan media files, returning how many rows were added
///
/// Nothing is adopted while a download is running: its files are still being
/// written and renamed.
pub fn sync_library(store: &JobStore) -> Result<usize> {
    let dir = store.download_dir();
    let downloading = store.count_by_status(JobStatus::Downloading)?;
    if downloading > 0 {
        debug!(downloading, "Download in progress, library scan deferred");
        return Ok(0);
    }
    debug!(dir = %dir.display(), "Scanning download folder");

    let mut adopted = 0;
    for filename in media_files(dir)? {
        if is_partial_download(&filename) || store.has_filename(&filename)? {
            continue;
        }
        info!(filename = %filename, "Indexing orphan file");
        store.adopt_file(&filename, &title_from_filename(&filename))?;
        adopted += 1;
    }

    Ok(adopted)
}

/// Find a file whose stem matches `stem`, whatever its extension
///
/// The retrieval tool may rename the output during post-processing (remux,
/// merge), so the predicted name can miss while the file is there. Media
/// extensions win over anything else sharing the stem.
pub fn find_by_stem(dir: &Path, stem: &str) -> io::Result<Option<String>> {
    let mut candidates: Vec<String> = entries(dir)?
        .into_iter()
        .filter(|name| Path::new(name).file_stem().and_then(|s| s.to_str()) == Some(stem))
        .collect();
    candidates.sort_by_key(|name| (!is_media_file(Path::new(name)), name.clone()));
    Ok(candidates.into_iter().next())
}

fn media_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut files: Vec<String> = entries(dir)?
        .into_iter()
        .filter(|name| is_media_file(Path::new(name)))
        .collect();
    files.sort();
    Ok(files)
}

/// Plain file names in `dir`; a missing directory is simply empty
fn entries(dir: &Path) -> io::Result<Vec<String>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
