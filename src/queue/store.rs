use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::error::{Result, StoreError};
use super::models::{
    DEFAULT_SINGER, Job, JobStatus, JobUpdate, LIBRARY_SINGER, LOCAL_FILE_URL,
};

const JOB_COLUMNS: &str = "id, url, status, title, singer, filename";

/// SQLite-backed job table, the single source of truth for queue and history
///
/// Layout:
/// - `jobs` table: `id INTEGER PRIMARY KEY AUTOINCREMENT` gives the FIFO order
/// - one connection behind a mutex; every statement commits on its own, so a
///   crash never loses a transition that returned `Ok`
///
/// Each status value is claimed by exactly one worker, which together with the
/// single connection makes `claim_oldest` race-free without row locks.
pub struct JobStore {
    conn: Mutex<Connection>,
    download_dir: PathBuf,
}

impl JobStore {
    /// Open or create the store at the specified path
    pub fn open<P: AsRef<Path>>(path: P, download_dir: impl Into<PathBuf>) -> Result<Self> {
        info!("Opening job store at: {}", path.as_ref().display());

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn, download_dir.into())
    }

    /// In-memory store, used by tests
    pub fn open_in_memory(download_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, download_dir.into())
    }

    fn with_connection(conn: Connection, download_dir: PathBuf) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            download_dir,
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-written: SQLite rolled it back
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Boot-time sweep: the queue does not survive a restart
    ///
    /// Every job left pending, downloading, ready or playing by a previous run
    /// is marked played. In-flight subprocess state is unknown, so it is
    /// discarded rather than resumed.
    pub fn reset_interrupted(&self) -> Result<usize> {
        let in_flight: Vec<JobStatus> = JobStatus::ALL
            .into_iter()
            .filter(JobStatus::is_in_flight)
            .collect();
        let placeholders = vec!["?"; in_flight.len()].join(", ");
        let changed = self.conn().execute(
            &format!("UPDATE jobs SET status = ? WHERE status IN ({placeholders})"),
            params_from_iter(std::iter::once(JobStatus::Played).chain(in_flight)),
        )?;
        info!(cleared = changed, "Cleared previous queue");
        Ok(changed)
    }

    /// Add a song request
    ///
    /// If an earlier job with the same url already produced a file that is
    /// still on disk, the new job starts out `ready` with that file and the
    /// retrieval tool is never invoked.
    pub fn enqueue(&self, url: &str, title: &str, singer: &str) -> Result<Job> {
        let singer = if singer.trim().is_empty() {
            DEFAULT_SINGER
        } else {
            singer.trim()
        };
        let title = if title.trim().is_empty() {
            url
        } else {
            title.trim()
        };

        let conn = self.conn();

        let cached = cached_filename(&conn, url, title)?
            .filter(|filename| self.download_dir.join(filename).is_file());

        let (status, filename) = match cached {
            Some(filename) => {
                info!(url, filename = %filename, "Instant add from cache");
                (JobStatus::Ready, filename)
            }
            None => (JobStatus::Pending, String::new()),
        };

        conn.execute(
            "INSERT INTO jobs (url, status, title, singer, filename, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![url, status, title, singer, filename, Utc::now().to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();

        debug!(id, url, %status, "Job enqueued");

        Ok(Job {
            id,
            url: url.to_string(),
            status,
            title: title.to_string(),
            singer: singer.to_string(),
            filename,
            progress: None,
            time_left: None,
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<Job>> {
        let job = self
            .conn()
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    /// Oldest job in `status`, without touching it
    pub fn peek_oldest(&self, status: JobStatus) -> Result<Option<Job>> {
        let job = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ?1 ORDER BY id ASC LIMIT 1"
                ),
                params![status],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    /// Select the oldest job in `from` and move it to `to` in one transaction
    ///
    /// Returns the job as claimed (already carrying the `to` status).
    pub fn claim_oldest(&self, from: JobStatus, to: JobStatus) -> Result<Option<Job>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let job = tx
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ?1 ORDER BY id ASC LIMIT 1"
                ),
                params![from],
                job_from_row,
            )
            .optional()?;

        let Some(mut job) = job else {
            return Ok(None);
        };

        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id: job.id,
                from,
                to,
            });
        }

        tx.execute(
            "UPDATE jobs SET status = ?1 WHERE id = ?2",
            params![to, job.id],
        )?;
        tx.commit()?;

        job.status = to;
        debug!(id = job.id, %from, %to, "Job claimed");
        Ok(Some(job))
    }

    /// Apply a worker status change
    ///
    /// Returns `Ok(false)` when the job no longer exists (deleted while being
    /// worked on) and an error when the edge is not part of the state machine.
    pub fn transition(&self, id: i64, update: JobUpdate) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let current: Option<JobStatus> = tx
            .query_row(
                "SELECT status FROM jobs WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(current) = current else {
            return Ok(false);
        };

        if !current.can_transition_to(update.status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: current,
                to: update.status,
            });
        }

        tx.execute(
            "UPDATE jobs
             SET status = ?1,
                 filename = COALESCE(?2, filename),
                 title = COALESCE(?3, title)
             WHERE id = ?4",
            params![update.status, update.filename, update.title, id],
        )?;
        tx.commit()?;

        debug!(id, from = %current, to = %update.status, "Job transitioned");
        Ok(true)
    }

    /// Everything not yet played, in queue order
    pub fn list_active(&self) -> Result<Vec<Job>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status != ?1 ORDER BY id ASC"
        ))?;
        let jobs = stmt
            .query_map(params![JobStatus::Played], job_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Played jobs, one per distinct title (the most recent play wins), by title
    pub fn list_history(&self) -> Result<Vec<Job>> {
        let conn = self.conn();
        // SQLite takes the bare columns from the row that supplied MAX(id)
        let mut stmt = conn.prepare(
            "SELECT MAX(id), url, status, title, singer, filename
             FROM jobs WHERE status = ?1
             GROUP BY title ORDER BY title ASC",
        )?;
        let jobs = stmt
            .query_map(params![JobStatus::Played], job_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Send a failed or played job back to the queue
    pub fn retry(&self, id: i64) -> Result<Job> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut job = tx
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
                job_from_row,
            )
            .optional()?
            .ok_or(StoreError::JobNotFound(id))?;

        if !job.status.is_retryable() {
            return Err(StoreError::InvalidTransition {
                id,
                from: job.status,
                to: JobStatus::Pending,
            });
        }

        tx.execute(
            "UPDATE jobs SET status = ?1 WHERE id = ?2",
            params![JobStatus::Pending, id],
        )?;
        tx.commit()?;

        info!(id, from = %job.status, "Job retried");
        job.status = JobStatus::Pending;
        Ok(job)
    }

    /// Remove a job row; the media file, if any, stays on disk
    pub fn delete(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        if removed > 0 {
            info!(id, "Job deleted");
        }
        Ok(removed > 0)
    }

    /// Whether any row already references this file
    pub fn has_filename(&self, filename: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT id FROM jobs WHERE filename = ?1 LIMIT 1",
                params![filename],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Record a file found on disk as already-played history
    pub fn adopt_file(&self, filename: &str, title: &str) -> Result<Job> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO jobs (url, status, title, singer, filename, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                LOCAL_FILE_URL,
                JobStatus::Played,
                title,
                LIBRARY_SINGER,
                filename,
                Utc::now().to_rfc3339()
            ],
        )?;

        Ok(Job {
            id: conn.last_insert_rowid(),
            url: LOCAL_FILE_URL.to_string(),
            status: JobStatus::Played,
            title: title.to_string(),
            singer: LIBRARY_SINGER.to_string(),
            filename: filename.to_string(),
            progress: None,
            time_left: None,
        })
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Health check - verify the database answers
    pub fn health_check(&self) -> Result<()> {
        self.conn().query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            url        TEXT,
            status     TEXT,
            title      TEXT,
            singer     TEXT,
            filename   TEXT,
            created_at DATETIME
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
        CREATE INDEX IF NOT EXISTS idx_jobs_url ON jobs(url);
        "#,
    )
}

/// Newest file an identical request already resolved to
///
/// Adopted library files share the `local_file` url, so for those the title
/// has to match as well.
fn cached_filename(conn: &Connection, url: &str, title: &str) -> rusqlite::Result<Option<String>> {
    if url == LOCAL_FILE_URL {
        conn.query_row(
            "SELECT filename FROM jobs
             WHERE url = ?1 AND title = ?2 AND filename != ''
             ORDER BY id DESC LIMIT 1",
            params![url, title],
            |row| row.get(0),
        )
        .optional()
    } else {
        conn.query_row(
            "SELECT filename FROM jobs
             WHERE url = ?1 AND filename != ''
             ORDER BY id DESC LIMIT 1",
            params![url],
            |row| row.get(0),
        )
        .optional()
    }
}

/// Older databases left `filename` NULL until a download finished
fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        url: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        status: row.get(2)?,
        title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        singer: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        filename: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        progress: None,
        time_left: None,
    })
}
