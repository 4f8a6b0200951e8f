use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{
    services::{add, delete, health, page_data, retry, search, skip},
    state::AppState,
};
use crate::config::Config;
use crate::media::{ControlChannel, Mpv, YtDlp};
use crate::observability::Counters;
use crate::queue::JobStore;
use crate::queue::library::sync_library;
use crate::search::SearchAggregator;
use crate::worker::{NowPlaying, ProgressBoard, WorkerDeps, Workers};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/data", get(page_data))
        .route("/api/search", get(search))
        .route("/api/retry", get(retry).post(retry))
        .route("/add", post(add))
        .route("/skip", get(skip).post(skip))
        .route("/delete", get(delete).post(delete))
        .route("/health", get(health))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Boot the whole service: store, workers, HTTP server
///
/// Returns once a shutdown signal has been handled and the workers have
/// stopped.
pub async fn run(config: Config) -> Result<(), AnyError> {
    let download_dir = config.server.download_dir.clone();

    fs::create_dir_all(&download_dir)
        .map_err(|e| format!("Failed to create {}: {}", download_dir.display(), e))?;

    info!(path = %config.server.db_path.display(), "Opening job store");
    let store = JobStore::open(&config.server.db_path, download_dir.clone())
        .map_err(|e| format!("Failed to open job store: {}", e))?;
    store.reset_interrupted()?;
    let adopted = sync_library(&store)?;
    info!(adopted, "Library synchronized");
    let store = Arc::new(store);

    let counters = Arc::new(Counters::new());
    let progress = Arc::new(ProgressBoard::new());
    let now_playing = Arc::new(NowPlaying::new());
    let control = ControlChannel::new(
        config.player.ipc_socket.clone(),
        config.workers.control_deadline(),
    );

    let retriever = YtDlp::new(&config.retrieval, download_dir);
    let search = SearchAggregator::from_config(&config, retriever.clone())?
        .with_counters(Arc::clone(&counters));

    let workers = Workers::spawn(
        &config,
        WorkerDeps {
            store: Arc::clone(&store),
            retriever: Arc::new(retriever),
            launcher: Arc::new(Mpv::new(&config.player, config.workers.osd_level)),
            control: control.clone(),
            progress: Arc::clone(&progress),
            now_playing: Arc::clone(&now_playing),
            counters: Arc::clone(&counters),
        },
    );

    let address: SocketAddr = config.server.bind_addr;
    let state = AppState::new(
        store,
        Arc::new(search),
        progress,
        now_playing,
        control,
        counters,
    );

    let listener = TcpListener::bind(address).await?;
    info!(%address, "karaokebox listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    workers.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
