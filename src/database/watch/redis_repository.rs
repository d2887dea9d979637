use std::sync::Arc;

use anyhow::{Context, Result};
use redis::AsyncCommands;
use tracing::warn;

use crate::database::RedisDatabase;

use super::{ContentType, WatchItem, WatchRepository, watch_slot};

/// one hash per owner keyed by "<content_type>:<content_id>"
pub struct RedisWatchRepository {
    redis: Arc<RedisDatabase>,
}

impl RedisWatchRepository {
    pub fn new(redis: Arc<RedisDatabase>) -> Self {
        Self { redis }
    }

    fn watch_key(owner: &str) -> String {
        format!("watch:{}", owner)
    }
}

#[async_trait::async_trait]
impl WatchRepository for RedisWatchRepository {
    async fn list_items(&self, owner: &str) -> Result<Vec<WatchItem>> {
        let mut conn = self.redis.connection();
        let values: Vec<String> = conn
            .hvals(Self::watch_key(owner))
            .await
            .context("Failed to list watch progress")?;

        Ok(values
            .iter()
            .filter_map(|raw| {
                serde_json::from_str(raw)
                    .inspect_err(|e| warn!("Skipping unreadable watch record for {}: {}", owner, e))
                    .ok()
            })
            .collect())
    }

    async fn find_item(
        &self,
        owner: &str,
        content_id: i64,
        content_type: ContentType,
    ) -> Result<Option<WatchItem>> {
        let mut conn = self.redis.connection();
        let raw: Option<String> = conn
            .hget(Self::watch_key(owner), watch_slot(content_id, content_type))
            .await
            .context("Failed to get watch progress")?;

        raw.map(|raw| serde_json::from_str(&raw).context("Failed to decode watch progress"))
            .transpose()
    }

    async fn save_item(&self, owner: &str, item: &WatchItem) -> Result<()> {
        let raw = serde_json::to_string(item).context("Failed to encode watch progress")?;

        let mut conn = self.redis.connection();
        let _: () = conn
            .hset(Self::watch_key(owner), item.slot(), raw)
            .await
            .context("Failed to save watch progress")?;

        Ok(())
    }

    async fn delete_item(&self, owner: &str, id: &str) -> Result<bool> {
        // items are keyed by slot, not id, so find the slot first
        let Some(slot) = self
            .list_items(owner)
            .await?
            .into_iter()
            .find(|item| item.id == id)
            .map(|item| item.slot())
        else {
            return Ok(false);
        };

        let mut conn = self.redis.connection();
        let deleted: i64 = conn
            .hdel(Self::watch_key(owner), slot)
            .await
            .context("Failed to delete watch progress")?;

        Ok(deleted > 0)
    }
}
