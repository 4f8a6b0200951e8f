//! Download progress extraction and sharing

use regex::Regex;
use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock};
use tracing::{debug, warn};

/// Shown once the tool starts merging or reports 100%
pub const FINALIZING: &str = "Finalizing";

static PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*(\d{1,3}(?:\.\d+)?)%").expect("percent pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Downloading,
    Finalizing,
}

/// Turns retrieval tool output lines into progress strings
///
/// Finalizing is terminal: the tool prints further percentages while
/// merging streams and those must not move the display backwards.
#[derive(Debug)]
pub struct ProgressParser {
    job_id: i64,
    phase: Phase,
}

impl ProgressParser {
    pub fn new(job_id: i64) -> Self {
        Self {
            job_id,
            phase: Phase::Downloading,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Feed one line; returns the new progress string when it changed
    pub fn observe(&mut self, line: &str) -> Option<String> {
        if line.contains("ERROR") || line.contains("WARNING") {
            warn!(job_id = self.job_id, "[yt-dlp] {line}");
        } else if line.contains("MiB/s") {
            debug!(job_id = self.job_id, "[yt-dlp] {line}");
        }

        if self.phase == Phase::Finalizing {
            return None;
        }

        if line.contains("[Merger]") || line.contains("Merging formats") || line.contains("100%") {
            self.phase = Phase::Finalizing;
            return Some(FINALIZING.to_string());
        }

        if line.contains("[download]") {
            if let Some(caps) = PERCENT.captures(line) {
                return Some(format!("{}%", &caps[1]));
            }
        }

        None
    }
}

/// Latest progress string per downloading job
#[derive(Debug, Default)]
pub struct ProgressBoard {
    entries: RwLock<HashMap<i64, String>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, job_id: i64, progress: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, progress);
    }

    pub fn clear(&self, job_id: i64) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
    }

    pub fn get(&self, job_id: i64) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut ProgressParser, lines: &[&str]) -> Vec<String> {
        lines.iter().filter_map(|l| parser.observe(l)).collect()
    }

    #[test]
    fn test_typical_download_sequence() {
        let mut parser = ProgressParser::new(1);
        let updates = feed(
            &mut parser,
            &[
                "[youtube] abc: Downloading webpage",
                "[download] Destination: /srv/downloads/Song.f134.mp4",
                "[download]  10.0% of   12.34MiB at    1.20MiB/s ETA 00:09",
                "[download]  55.5% of   12.34MiB at    2.00MiB/s ETA 00:03",
                "[Merger] Merging formats into \"/srv/downloads/Song.mp4\"",
                "[download]  20.0% of 3.00MiB",
            ],
        );

        assert_eq!(updates, vec!["10.0%", "55.5%", "Finalizing"]);
        assert_eq!(parser.phase(), Phase::Finalizing);
    }

    #[test]
    fn test_hundred_percent_finalizes() {
        let mut parser = ProgressParser::new(1);
        let updates = feed(
            &mut parser,
            &[
                "[download]   7%",
                "[download] 100% of 12.34MiB in 00:05",
                "[download]  50.0% of 1.00MiB",
            ],
        );
        assert_eq!(updates, vec!["7%", "Finalizing"]);
    }

    #[test]
    fn test_percent_outside_download_lines_ignored() {
        let mut parser = ProgressParser::new(1);
        assert_eq!(parser.observe("[info] 42% of formats skipped"), None);
        assert_eq!(parser.observe("WARNING: 30% slower mirror"), None);
        assert_eq!(parser.phase(), Phase::Downloading);
    }

    #[test]
    fn test_board_set_and_clear() {
        let board = ProgressBoard::new();
        board.set(7, "12.5%".to_string());
        assert_eq!(board.get(7).as_deref(), Some("12.5%"));

        board.set(7, FINALIZING.to_string());
        assert_eq!(board.get(7).as_deref(), Some("Finalizing"));

        board.clear(7);
        assert_eq!(board.get(7), None);
    }
}
