use axum::{
    Form, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{
    error::ApiError,
    models::{AddForm, HealthResponse, IdQuery, PageData, SearchQuery},
    state::AppState,
};
use crate::humanize;
use crate::queue::JobStatus;

/// Queue and history snapshot (GET /api/data)
///
/// Downloading jobs carry their latest progress string; the playing job
/// carries the remaining time when the player answers in time.
pub async fn page_data(State(state): State<AppState>) -> Result<Json<PageData>, ApiError> {
    let mut queue = state.store.list_active()?;

    for job in &mut queue {
        match job.status {
            JobStatus::Downloading => job.progress = state.progress.get(job.id),
            JobStatus::Playing => {
                job.time_left = state
                    .control
                    .time_remaining()
                    .await
                    .ok()
                    .and_then(humanize::countdown);
            }
            _ => {}
        }
    }

    let history = state.store.list_history()?;
    Ok(Json(PageData { queue, history }))
}

/// Song search (GET /api/search?q=)
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state
        .search
        .search(&params.q)
        .await
        .map_err(|e| ApiError::SearchFailed(e.to_string()))?;
    Ok(Json(results))
}

/// Put a failed or played job back in the download queue (GET|POST /api/retry?id=)
pub async fn retry(
    State(state): State<AppState>,
    Query(params): Query<IdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = params
        .id
        .ok_or_else(|| ApiError::InvalidPayload("id is required".to_string()))?;
    let job = state.store.retry(id)?;
    info!(job_id = id, "Job re-queued");
    Ok(Json(job))
}

/// Request a song (POST /add)
///
/// A url already downloaded earlier goes straight to `ready`.
pub async fn add(
    State(state): State<AppState>,
    Form(form): Form<AddForm>,
) -> Result<impl IntoResponse, ApiError> {
    let url = form.url.trim();
    if url.is_empty() {
        return Err(ApiError::InvalidPayload("url is required".to_string()));
    }

    let job = state.store.enqueue(url, &form.title, &form.singer)?;
    state.counters.job_enqueued();
    if job.status == JobStatus::Ready {
        state.counters.cache_hit();
    }
    info!(job_id = job.id, singer = %job.singer, title = %job.title, status = %job.status, "Song requested");

    Ok(Json(job))
}

/// Stop the current song (GET|POST /skip)
pub async fn skip(State(state): State<AppState>) -> Redirect {
    if state.now_playing.skip() {
        state.counters.skipped();
    }
    Redirect::to("/")
}

/// Remove a job (GET|POST /delete?id=)
pub async fn delete(
    State(state): State<AppState>,
    Query(params): Query<IdQuery>,
) -> Result<Redirect, ApiError> {
    if let Some(id) = params.id {
        if !state.store.delete(id)? {
            warn!(job_id = id, "Delete of unknown job");
        }
    }
    Ok(Redirect::to("/"))
}

/// Component status and counters (GET /health)
///
/// 503 when the job store cannot be queried. The player being idle or its
/// control socket missing is reported but does not make the service unhealthy.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();

    let store_ok = match state.store.health_check() {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Job store health check failed");
            false
        }
    };
    components.insert(
        "store".to_string(),
        if store_ok { "healthy" } else { "unhealthy" }.to_string(),
    );

    let now_playing = state.now_playing.current();
    components.insert(
        "player".to_string(),
        if now_playing.is_some() { "playing" } else { "idle" }.to_string(),
    );
    components.insert(
        "control_socket".to_string(),
        if state.control.is_present() { "present" } else { "absent" }.to_string(),
    );

    let (status, status_code) = if store_ok {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status: status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        now_playing,
        counters: state.counters.snapshot(),
    };

    (status_code, Json(response))
}
