use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use super::fallback::YtDlpSearch;
use super::invidious::InvidiousProvider;
use super::models::SearchResult;
use super::{SearchError, SearchProvider};
use crate::config::Config;
use crate::media::YtDlp;
use crate::observability::Counters;

pub struct SearchAggregator {
    providers: Vec<Arc<dyn SearchProvider>>,
    fallback: Arc<dyn SearchProvider>,
    deadline: Duration,
    keyword: String,
    counters: Option<Arc<Counters>>,
}

impl SearchAggregator {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        fallback: Arc<dyn SearchProvider>,
        deadline: Duration,
        keyword: impl Into<String>,
    ) -> Self {
        Self {
            providers,
            fallback,
            deadline,
            keyword: keyword.into(),
            counters: None,
        }
    }

    pub fn with_counters(mut self, counters: Arc<Counters>) -> Self {
        self.counters = Some(counters);
        self
    }

    fn count(&self, record: impl FnOnce(&Counters)) {
        if let Some(counters) = &self.counters {
            record(counters);
        }
    }

    /// One Invidious provider per configured endpoint, yt-dlp as fallback
    pub fn from_config(config: &Config, tool: YtDlp) -> Result<Self, SearchError> {
        let client = Client::builder()
            .connect_timeout(config.search.deadline())
            .timeout(config.search.deadline())
            .user_agent(concat!("karaokebox/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let providers = config
            .search
            .providers
            .iter()
            .map(|endpoint| {
                Arc::new(InvidiousProvider::new(
                    endpoint.clone(),
                    client.clone(),
                    config.search.max_results,
                )) as Arc<dyn SearchProvider>
            })
            .collect();
        let fallback = Arc::new(YtDlpSearch::new(tool, config.retrieval.search_results));

        Ok(Self::new(
            providers,
            fallback,
            config.search.deadline(),
            config.search.keyword.clone(),
        ))
    }

    /// Append the genre keyword unless the query already mentions it
    pub fn effective_query(&self, query: &str) -> String {
        let query = query.trim();
        if self.keyword.is_empty() || query.to_lowercase().contains(&self.keyword.to_lowercase()) {
            query.to_string()
        } else {
            format!("{query} {}", self.keyword)
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query = self.effective_query(query);
        info!(query = %query, "Searching");

        if let Some(results) = self.race(&query).await {
            info!(count = results.len(), "Fast search succeeded");
            self.count(Counters::search_fast);
            return Ok(results);
        }

        info!("Fast search found nothing in time, switching to local fallback");
        match self.fallback.search(&query).await {
            Ok(results) => {
                self.count(Counters::search_fallback);
                Ok(results)
            }
            Err(e) => {
                warn!(error = %e, "Fallback search failed");
                self.count(Counters::search_failed);
                Err(SearchError::Unavailable(e.to_string()))
            }
        }
    }

    /// First non-empty provider answer before the deadline, if any
    ///
    /// Losing providers keep running until they finish or the deadline
    /// passes; their answers land in a full channel and are dropped.
    async fn race(&self, query: &str) -> Option<Vec<SearchResult>> {
        if self.providers.is_empty() {
            return None;
        }

        let deadline = Instant::now() + self.deadline;
        let (tx, mut rx) = mpsc::channel(1);

        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let tx = tx.clone();
            let query = query.to_string();

            tokio::spawn(async move {
                match timeout_at(deadline, provider.search(&query)).await {
                    Ok(Ok(results)) if !results.is_empty() => {
                        let _ = tx.try_send(results);
                    }
                    Ok(Ok(_)) => debug!(provider = provider.name(), "Empty answer"),
                    Ok(Err(e)) => debug!(provider = provider.name(), error = %e, "Provider failed"),
                    Err(_) => debug!(provider = provider.name(), "Provider missed the deadline"),
                }
            });
        }
        // recv() yields None once every provider task has finished
        drop(tx);

        timeout_at(deadline, rx.recv()).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fake {
        name: &'static str,
        delay: Duration,
        outcome: Result<Vec<SearchResult>, &'static str>,
        calls: AtomicUsize,
    }

    impl Fake {
        fn answering(name: &'static str, delay_ms: u64, ids: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay: Duration::from_millis(delay_ms),
                outcome: Ok(ids
                    .iter()
                    .map(|id| SearchResult::for_video(id, id, name, "1:00"))
                    .collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay: Duration::ZERO,
                outcome: Err("boom"),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for Fake {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.outcome
                .clone()
                .map_err(|e| SearchError::Unavailable(e.to_string()))
        }
    }

    fn aggregator(
        providers: Vec<Arc<Fake>>,
        fallback: Arc<Fake>,
        deadline_ms: u64,
    ) -> SearchAggregator {
        SearchAggregator::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn SearchProvider>)
                .collect(),
            fallback,
            Duration::from_millis(deadline_ms),
            "karaoke",
        )
    }

    #[test]
    fn test_effective_query() {
        let agg = aggregator(vec![], Fake::failing("fb"), 100);
        assert_eq!(agg.effective_query("queen"), "queen karaoke");
        assert_eq!(agg.effective_query("Queen KARAOKE"), "Queen KARAOKE");
        assert_eq!(agg.effective_query("  abba  "), "abba karaoke");
    }

    #[tokio::test]
    async fn test_empty_query_searches_nothing() {
        let provider = Fake::answering("a", 0, &["x"]);
        let fallback = Fake::answering("fb", 0, &["y"]);
        let agg = aggregator(vec![provider.clone()], fallback.clone(), 100);

        assert!(agg.search("   ").await.unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fastest_provider_wins() {
        let fast = Fake::answering("fast", 100, &["fast1", "fast2"]);
        let slow = Fake::answering("slow", 2000, &["slow1"]);
        let fallback = Fake::answering("fb", 0, &["fb1"]);
        let agg = aggregator(vec![slow, fast], fallback.clone(), 3000);

        let results = agg.search("queen").await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["fast1", "fast2"]);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_and_failing_providers_do_not_win() {
        let empty = Fake::answering("empty", 10, &[]);
        let broken = Fake::failing("broken");
        let late = Fake::answering("late", 200, &["late1"]);
        let agg = aggregator(vec![empty, broken, late], Fake::failing("fb"), 3000);

        let results = agg.search("queen").await.unwrap();
        assert_eq!(results[0].id, "late1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_providers_fall_back_at_deadline() {
        let stalled = Fake::answering("stalled", 60_000, &["never"]);
        let fallback = Fake::answering("fb", 0, &["fb1"]);
        let agg = aggregator(vec![stalled], fallback.clone(), 3000);

        let started = Instant::now();
        let results = agg.search("queen").await.unwrap();

        assert_eq!(results[0].id, "fb1");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert!(started.elapsed() < Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_providers_failing_falls_back_early() {
        let fallback = Fake::answering("fb", 0, &["fb1"]);
        let agg = aggregator(
            vec![Fake::failing("a"), Fake::failing("b")],
            fallback,
            3000,
        );

        let started = Instant::now();
        let results = agg.search("queen").await.unwrap();
        assert_eq!(results[0].id, "fb1");
        assert!(started.elapsed() < Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_failure_is_unavailable() {
        let counters = Arc::new(Counters::new());
        let agg = aggregator(vec![Fake::failing("a")], Fake::failing("fb"), 3000)
            .with_counters(Arc::clone(&counters));

        let err = agg.search("queen").await.unwrap_err();
        assert!(matches!(err, SearchError::Unavailable(_)));
        assert_eq!(counters.snapshot().searches_failed, 1);
    }
}
