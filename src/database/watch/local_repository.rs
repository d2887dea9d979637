use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::RwLock;

use super::{ContentType, WatchItem, WatchRepository, watch_slot};

#[derive(Default)]
pub struct LocalWatchRepository {
    // owner -> slot -> item
    items: RwLock<HashMap<String, HashMap<String, WatchItem>>>,
}

impl LocalWatchRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl WatchRepository for LocalWatchRepository {
    async fn list_items(&self, owner: &str) -> Result<Vec<WatchItem>> {
        let items = self.items.read().await;
        Ok(items
            .get(owner)
            .map(|owned| owned.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_item(
        &self,
        owner: &str,
        content_id: i64,
        content_type: ContentType,
    ) -> Result<Option<WatchItem>> {
        let items = self.items.read().await;
        Ok(items
            .get(owner)
            .and_then(|owned| owned.get(&watch_slot(content_id, content_type)))
            .cloned())
    }

    async fn save_item(&self, owner: &str, item: &WatchItem) -> Result<()> {
        let mut items = self.items.write().await;
        items
            .entry(owner.to_string())
            .or_default()
            .insert(item.slot(), item.clone());
        Ok(())
    }

    async fn delete_item(&self, owner: &str, id: &str) -> Result<bool> {
        let mut items = self.items.write().await;
        let Some(owned) = items.get_mut(owner) else {
            return Ok(false);
        };

        let before = owned.len();
        owned.retain(|_, item| item.id != id);
        Ok(owned.len() != before)
    }
}
