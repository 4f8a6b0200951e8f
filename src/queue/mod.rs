//! Durable job queue
//!
//! The job table is the only channel between the workers: the HTTP layer
//! inserts `pending` jobs, the download worker turns them `ready`, the
//! playback worker turns them `played`. Nothing else carries queue state.

pub mod error;
pub mod library;
pub mod models;
pub mod store;

pub use error::{Result, StoreError};
pub use models::{
    DEFAULT_SINGER, Job, JobStatus, JobUpdate, LIBRARY_SINGER, LOCAL_FILE_URL, UnknownStatus,
};
pub use store::JobStore;
