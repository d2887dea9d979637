use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::RwLock;

use super::{ChannelRepository, CustomChannel, sort_newest_first};

/// process local channel storage, used without redis and as the read fallback
#[derive(Default)]
pub struct LocalChannelRepository {
    // owner -> name -> channel
    channels: RwLock<HashMap<String, HashMap<String, CustomChannel>>>,
}

impl LocalChannelRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ChannelRepository for LocalChannelRepository {
    async fn list_channels(&self, owner: &str) -> Result<Vec<CustomChannel>> {
        let channels = self.channels.read().await;
        let mut list: Vec<CustomChannel> = channels
            .get(owner)
            .map(|owned| owned.values().cloned().collect())
            .unwrap_or_default();

        sort_newest_first(&mut list);
        Ok(list)
    }

    async fn get_channel(&self, owner: &str, name: &str) -> Result<Option<CustomChannel>> {
        let channels = self.channels.read().await;
        Ok(channels.get(owner).and_then(|owned| owned.get(name)).cloned())
    }

    async fn insert_channel(&self, owner: &str, channel: &CustomChannel) -> Result<bool> {
        let mut channels = self.channels.write().await;
        let owned = channels.entry(owner.to_string()).or_default();

        if owned.contains_key(&channel.name) {
            return Ok(false);
        }
        owned.insert(channel.name.clone(), channel.clone());
        Ok(true)
    }

    async fn save_channel(&self, owner: &str, channel: &CustomChannel) -> Result<()> {
        let mut channels = self.channels.write().await;
        channels
            .entry(owner.to_string())
            .or_default()
            .insert(channel.name.clone(), channel.clone());
        Ok(())
    }

    async fn replace_channel(
        &self,
        owner: &str,
        previous_name: &str,
        channel: &CustomChannel,
    ) -> Result<bool> {
        let mut channels = self.channels.write().await;
        let owned = channels.entry(owner.to_string()).or_default();

        if channel.name != previous_name && owned.contains_key(&channel.name) {
            return Ok(false);
        }
        owned.remove(previous_name);
        owned.insert(channel.name.clone(), channel.clone());
        Ok(true)
    }

    async fn delete_channel(&self, owner: &str, name: &str) -> Result<bool> {
        let mut channels = self.channels.write().await;
        Ok(channels
            .get_mut(owner)
            .map(|owned| owned.remove(name).is_some())
            .unwrap_or(false))
    }
}
