use serde::{Deserialize, Serialize};

/// One search hit, whatever source produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration_string: String,
    pub url: String,
    pub thumbnail: String,
}

impl SearchResult {
    /// Build a result for a YouTube video id, with the default thumbnail
    pub fn for_video(id: &str, title: &str, uploader: &str, duration: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            uploader: uploader.to_string(),
            duration_string: duration.to_string(),
            url: watch_url(id),
            thumbnail: default_thumbnail(id),
        }
    }
}

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

pub fn default_thumbnail(id: &str) -> String {
    format!("https://i.ytimg.com/vi/{id}/mqdefault.jpg")
}
