//! Request and response shapes of the HTTP surface
//!
//! - `GET /api/data` returns [`PageData`]: the active queue (with live
//!   `progress` / `time_left`) and the deduplicated history
//! - `POST /add` takes an [`AddForm`] and returns the created job
//! - `/api/retry` and `/delete` take an [`IdQuery`]
//! - `GET /api/search` takes a [`SearchQuery`]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::observability::CountersSnapshot;
use crate::queue::Job;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PageData {
    pub queue: Vec<Job>,
    pub history: Vec<Job>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AddForm {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub singer: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IdQuery {
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
    pub now_playing: Option<i64>,
    pub counters: CountersSnapshot,
}
