use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use mockall::automock;
use serde::{Deserialize, Serialize};

/// how the player should open the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Hls,
    Mpd,
    Youtube,
}

/// a user supplied channel, stored per owner and looked up by name
///
/// field names are camelCase on the wire because the web player reads these records as is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomChannel {
    pub id: String,
    pub name: String,
    pub manifest_uri: String,
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    pub logo: String,
    pub category: String,
    /// keyId -> key, only ever set on mpd channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_key: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_channel_id: Option<String>,
    #[serde(default)]
    pub has_multiple_streams: bool,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_CATEGORY: &str = "Custom";

pub type DynChannelRepository = Arc<dyn ChannelRepository + Send + Sync>;

#[automock]
#[async_trait::async_trait]
pub trait ChannelRepository {
    async fn list_channels(&self, owner: &str) -> Result<Vec<CustomChannel>>;
    async fn get_channel(&self, owner: &str, name: &str) -> Result<Option<CustomChannel>>;
    /// stores `channel` only when its name is free, false when the name is already taken
    async fn insert_channel(&self, owner: &str, channel: &CustomChannel) -> Result<bool>;
    /// overwrites the record stored under `channel.name`
    async fn save_channel(&self, owner: &str, channel: &CustomChannel) -> Result<()>;
    /// removes `previous_name` and stores `channel` in one step, false (and nothing changed)
    /// when the new name already belongs to another channel
    async fn replace_channel(
        &self,
        owner: &str,
        previous_name: &str,
        channel: &CustomChannel,
    ) -> Result<bool>;
    async fn delete_channel(&self, owner: &str, name: &str) -> Result<bool>;
}

/// newest first, ties broken by id so listings are stable
pub fn sort_newest_first(channels: &mut [CustomChannel]) {
    channels.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
