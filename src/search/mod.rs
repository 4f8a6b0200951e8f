//! Song search
//!
//! Remote Invidious endpoints race each other under one deadline; the first
//! non-empty answer wins. When none answers in time the local retrieval tool
//! is asked instead.

pub mod aggregator;
pub mod fallback;
pub mod invidious;
pub mod models;

pub use aggregator::SearchAggregator;
pub use fallback::YtDlpSearch;
pub use invidious::InvidiousProvider;
pub use models::SearchResult;

use async_trait::async_trait;
use thiserror::Error;

use crate::media::ToolError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("search unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Label used in logs
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;
}
