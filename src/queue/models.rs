//! Job records and the status state machine
//!
//! ```text
//! pending ──claim──▶ downloading ──ok──▶ ready ──claim──▶ playing ──exit──▶ played
//!                         │                                  │
//!                         └──────────fail──▶ failed ◀──fail──┘
//! ```
//!
//! `failed` and `played` only leave through an explicit retry, which puts the
//! job back to `pending`.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Placeholder url for media adopted from the download directory
pub const LOCAL_FILE_URL: &str = "local_file";

/// Singer shown when the requester left the field blank
pub const DEFAULT_SINGER: &str = "Mystery Guest";

/// Singer recorded for files adopted from disk
pub const LIBRARY_SINGER: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Ready,
    Playing,
    Played,
    Failed,
}

#[derive(Debug, Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Downloading,
        JobStatus::Ready,
        JobStatus::Playing,
        JobStatus::Played,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Ready => "ready",
            JobStatus::Playing => "playing",
            JobStatus::Played => "played",
            JobStatus::Failed => "failed",
        }
    }

    /// Statuses a worker may move a job into this one from
    pub fn predecessors(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[],
            JobStatus::Downloading => &[JobStatus::Pending],
            JobStatus::Ready => &[JobStatus::Downloading],
            JobStatus::Playing => &[JobStatus::Ready],
            JobStatus::Played => &[JobStatus::Playing],
            JobStatus::Failed => &[JobStatus::Downloading, JobStatus::Playing],
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        next.predecessors().contains(self)
    }

    /// Only finished jobs can be sent back to the queue by hand
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Played)
    }

    /// Jobs in these states do not survive a restart
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Downloading | JobStatus::Ready | JobStatus::Playing
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// One requested song moving through the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub url: String,
    pub status: JobStatus,
    pub title: String,
    pub singer: String,
    /// Relative to the download directory; empty until the file is on disk
    pub filename: String,
    /// Download progress (`"42.0%"` or `"Finalizing"`), filled in on read
    #[serde(default, with = "blank_when_absent")]
    pub progress: Option<String>,
    /// Remaining playback time (`"-2:13"`), filled in on read
    #[serde(default, with = "blank_when_absent")]
    pub time_left: Option<String>,
}

/// Derived fields always appear on the wire; an unknown value is `""`
mod blank_when_absent {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.filter(|v| !v.is_empty()))
    }
}

impl Job {
    pub fn is_local_file(&self) -> bool {
        self.url == LOCAL_FILE_URL
    }
}

/// Status change applied by a worker, with the fields it settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub filename: Option<String>,
    pub title: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            filename: None,
            title: None,
        }
    }

    /// Download resolved to a file confirmed on disk
    pub fn ready(filename: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Ready,
            filename: Some(filename.into()),
            title: Some(title.into()),
        }
    }
}
