//! Invidious-compatible `/api/v1/search` endpoints

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::models::SearchResult;
use super::{SearchError, SearchProvider};
use crate::humanize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    video_id: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    length_seconds: u64,
    #[serde(default)]
    video_thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

pub struct InvidiousProvider {
    endpoint: String,
    client: Client,
    max_results: usize,
}

impl InvidiousProvider {
    pub fn new(endpoint: impl Into<String>, client: Client, max_results: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
            max_results,
        }
    }
}

#[async_trait]
impl SearchProvider for InvidiousProvider {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?;

        let items: Vec<Item> = response.json().await?;
        Ok(convert(items, self.max_results))
    }
}

/// Keep video items only, up to `limit`
fn convert(items: Vec<Item>, limit: usize) -> Vec<SearchResult> {
    items
        .into_iter()
        .filter(|item| item.kind == "video")
        .take(limit)
        .map(|item| {
            let mut result = SearchResult::for_video(
                &item.video_id,
                &item.title,
                &item.author,
                &humanize::clock(item.length_seconds),
            );
            if let Some(thumb) = item.video_thumbnails.into_iter().next() {
                result.thumbnail = thumb.url;
            }
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"[
        {"type":"channel","author":"Sing King"},
        {"type":"video","title":"Bohemian Rhapsody (Karaoke)","videoId":"abc123",
         "author":"Sing King","lengthSeconds":359,
         "videoThumbnails":[{"quality":"maxres","url":"https://img/abc123.jpg"}]},
        {"type":"playlist","title":"Queen hits"},
        {"type":"video","title":"Don't Stop Me Now","videoId":"def456",
         "author":"KaraFun","lengthSeconds":65}
    ]"#;

    #[test]
    fn test_convert_filters_and_formats() {
        let items: Vec<Item> = serde_json::from_str(BODY).unwrap();
        let results = convert(items, 10);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "abc123");
        assert_eq!(results[0].duration_string, "5:59");
        assert_eq!(results[0].thumbnail, "https://img/abc123.jpg");
        assert_eq!(results[0].url, "https://www.youtube.com/watch?v=abc123");

        assert_eq!(results[1].duration_string, "1:05");
        assert_eq!(
            results[1].thumbnail,
            "https://i.ytimg.com/vi/def456/mqdefault.jpg"
        );
    }

    #[test]
    fn test_convert_caps_results() {
        let items: Vec<Item> = (0..25)
            .map(|i| Item {
                kind: "video".to_string(),
                title: format!("Song {i}"),
                video_id: format!("id{i}"),
                author: String::new(),
                length_seconds: 0,
                video_thumbnails: Vec::new(),
            })
            .collect();

        assert_eq!(convert(items, 10).len(), 10);
    }

    #[test]
    fn test_convert_channel_only_is_empty() {
        let items: Vec<Item> =
            serde_json::from_str(r#"[{"type":"channel","author":"x"}]"#).unwrap();
        assert!(convert(items, 10).is_empty());
    }
}
