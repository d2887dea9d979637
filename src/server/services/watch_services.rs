use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::{
    database::watch::{DynWatchRepository, WatchItem},
    server::{
        dtos::watch_dto::UpsertProgressDto,
        error::{AppResult, Error},
    },
};

/// items below this are "barely started", above it "finished"
const MIN_CONTINUE_PROGRESS: f64 = 0.05;
const MAX_CONTINUE_PROGRESS: f64 = 0.95;
const CONTINUE_WATCHING_LIMIT: usize = 10;

pub type DynWatchService = Arc<dyn WatchServiceTrait + Send + Sync>;

#[async_trait]
pub trait WatchServiceTrait {
    async fn continue_watching(&self, owner: &str) -> AppResult<Vec<WatchItem>>;
    async fn upsert(&self, owner: &str, input: UpsertProgressDto) -> AppResult<WatchItem>;
    async fn remove(&self, owner: &str, id: &str) -> AppResult<()>;
}

pub struct WatchService {
    repository: DynWatchRepository,
}

impl WatchService {
    pub fn new(repository: DynWatchRepository) -> Self {
        Self { repository }
    }
}

fn in_progress(item: &WatchItem) -> bool {
    item.progress > MIN_CONTINUE_PROGRESS && item.progress < MAX_CONTINUE_PROGRESS
}

#[async_trait]
impl WatchServiceTrait for WatchService {
    async fn continue_watching(&self, owner: &str) -> AppResult<Vec<WatchItem>> {
        let mut items: Vec<WatchItem> = self
            .repository
            .list_items(owner)
            .await?
            .into_iter()
            .filter(in_progress)
            .collect();

        items.sort_by(|a, b| b.watched_at.cmp(&a.watched_at));
        items.truncate(CONTINUE_WATCHING_LIMIT);

        Ok(items)
    }

    async fn upsert(&self, owner: &str, input: UpsertProgressDto) -> AppResult<WatchItem> {
        let existing = self
            .repository
            .find_item(owner, input.content_id, input.content_type)
            .await?;

        let id = existing
            .map(|item| item.id)
            .unwrap_or_else(|| nanoid::nanoid!());

        let item = WatchItem {
            id,
            content_id: input.content_id,
            content_type: input.content_type,
            title: input.title.trim().to_string(),
            progress: input.progress,
            duration: input.duration,
            poster_path: input.poster_path,
            overview: input.overview,
            watched_at: Utc::now(),
        };

        self.repository.save_item(owner, &item).await?;
        debug!(
            "Progress for {} saved for {}: {:.2}",
            item.slot(),
            owner,
            item.progress
        );

        Ok(item)
    }

    async fn remove(&self, owner: &str, id: &str) -> AppResult<()> {
        if !self.repository.delete_item(owner, id).await? {
            return Err(Error::NotFound(format!("Watch item '{}' not found", id)));
        }

        Ok(())
    }
}
