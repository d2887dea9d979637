use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use mockall::automock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Tv,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => f.write_str("movie"),
            Self::Tv => f.write_str("tv"),
        }
    }
}

/// playback progress for one title, unique per (owner, content_id, content_type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchItem {
    pub id: String,
    pub content_id: i64,
    pub content_type: ContentType,
    pub title: String,
    /// fraction watched, 0.0 to 1.0
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    pub watched_at: DateTime<Utc>,
}

impl WatchItem {
    pub fn slot(&self) -> String {
        watch_slot(self.content_id, self.content_type)
    }
}

pub fn watch_slot(content_id: i64, content_type: ContentType) -> String {
    format!("{}:{}", content_type, content_id)
}

pub type DynWatchRepository = Arc<dyn WatchRepository + Send + Sync>;

#[automock]
#[async_trait::async_trait]
pub trait WatchRepository {
    async fn list_items(&self, owner: &str) -> Result<Vec<WatchItem>>;
    async fn find_item(
        &self,
        owner: &str,
        content_id: i64,
        content_type: ContentType,
    ) -> Result<Option<WatchItem>>;
    async fn save_item(&self, owner: &str, item: &WatchItem) -> Result<()>;
    async fn delete_item(&self, owner: &str, id: &str) -> Result<bool>;
}
