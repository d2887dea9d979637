use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::database::RedisDatabase;

// the free-name check and the move run as one script so a concurrent add can't slip in between
static RENAME_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r"
        if redis.call('HEXISTS', KEYS[1], ARGV[2]) == 1 then
            return 0
        end
        redis.call('HDEL', KEYS[1], ARGV[1])
        redis.call('HSET', KEYS[1], ARGV[2], ARGV[3])
        return 1
        ",
    )
});

use super::{ChannelRepository, CustomChannel, sort_newest_first};

/// one hash per owner, field is the channel name and value the json record
pub struct RedisChannelRepository {
    redis: Arc<RedisDatabase>,
}

impl RedisChannelRepository {
    pub fn new(redis: Arc<RedisDatabase>) -> Self {
        Self { redis }
    }

    fn channels_key(owner: &str) -> String {
        format!("channels:{}", owner)
    }
}

#[async_trait::async_trait]
impl ChannelRepository for RedisChannelRepository {
    async fn list_channels(&self, owner: &str) -> Result<Vec<CustomChannel>> {
        let mut conn = self.redis.connection();
        let values: Vec<String> = conn
            .hvals(Self::channels_key(owner))
            .await
            .context("Failed to list channels")?;

        let mut channels: Vec<CustomChannel> = values
            .iter()
            .filter_map(|raw| match serde_json::from_str(raw) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    // a broken record shouldn't hide the rest of the list
                    warn!("Skipping unreadable channel record for {}: {}", owner, e);
                    None
                }
            })
            .collect();

        sort_newest_first(&mut channels);
        debug!("Loaded {} channels for {}", channels.len(), owner);

        Ok(channels)
    }

    async fn get_channel(&self, owner: &str, name: &str) -> Result<Option<CustomChannel>> {
        let mut conn = self.redis.connection();
        let raw: Option<String> = conn
            .hget(Self::channels_key(owner), name)
            .await
            .context("Failed to get channel")?;

        raw.map(|raw| serde_json::from_str(&raw).context("Failed to decode channel"))
            .transpose()
    }

    async fn insert_channel(&self, owner: &str, channel: &CustomChannel) -> Result<bool> {
        let raw = serde_json::to_string(channel).context("Failed to encode channel")?;

        let mut conn = self.redis.connection();
        let inserted: bool = conn
            .hset_nx(Self::channels_key(owner), &channel.name, raw)
            .await
            .context("Failed to insert channel")?;

        Ok(inserted)
    }

    async fn save_channel(&self, owner: &str, channel: &CustomChannel) -> Result<()> {
        let raw = serde_json::to_string(channel).context("Failed to encode channel")?;

        let mut conn = self.redis.connection();
        let _: () = conn
            .hset(Self::channels_key(owner), &channel.name, raw)
            .await
            .context("Failed to save channel")?;

        Ok(())
    }

    async fn replace_channel(
        &self,
        owner: &str,
        previous_name: &str,
        channel: &CustomChannel,
    ) -> Result<bool> {
        let raw = serde_json::to_string(channel).context("Failed to encode channel")?;

        let mut conn = self.redis.connection();
        let replaced: i64 = RENAME_SCRIPT
            .key(Self::channels_key(owner))
            .arg(previous_name)
            .arg(&channel.name)
            .arg(raw)
            .invoke_async(&mut conn)
            .await
            .context("Failed to replace channel")?;

        Ok(replaced == 1)
    }

    async fn delete_channel(&self, owner: &str, name: &str) -> Result<bool> {
        let mut conn = self.redis.connection();
        let deleted: i64 = conn
            .hdel(Self::channels_key(owner), name)
            .await
            .context("Failed to delete channel")?;

        Ok(deleted > 0)
    }
}
