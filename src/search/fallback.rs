//! Retrieval tool search-only mode

use async_trait::async_trait;

use super::models::SearchResult;
use super::{SearchError, SearchProvider};
use crate::media::YtDlp;
use crate::media::retrieval::SEARCH_DELIMITER;

pub struct YtDlpSearch {
    tool: YtDlp,
    limit: usize,
}

impl YtDlpSearch {
    pub fn new(tool: YtDlp, limit: usize) -> Self {
        Self { tool, limit }
    }
}

#[async_trait]
impl SearchProvider for YtDlpSearch {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let output = self.tool.search_output(query, self.limit).await?;
        Ok(parse_lines(&output))
    }
}

/// `id<|>title<|>uploader<|>duration` per line; short lines are skipped
pub fn parse_lines(output: &str) -> Vec<SearchResult> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(SEARCH_DELIMITER).collect();
            match parts.as_slice() {
                [id, title, uploader, duration, ..] => {
                    Some(SearchResult::for_video(id, title, uploader, duration))
                }
                _ => None,
            }
        })
        .collect()
}
