use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use validator::{ValidationError, ValidationErrors};

use crate::{
    database::channel::{CustomChannel, DEFAULT_CATEGORY, DynChannelRepository, StreamType},
    server::{
        dtos::channel_dto::{ClearKeyInput, CreateChannelDto, UpdateChannelDto},
        error::{AppResult, Error},
        utils::channel_utils::{parse_clear_key, youtube_embed},
    },
};

pub type DynChannelsService = Arc<dyn ChannelsServiceTrait + Send + Sync>;

#[async_trait]
pub trait ChannelsServiceTrait {
    async fn list(&self, owner: &str) -> AppResult<Vec<CustomChannel>>;
    async fn add(&self, owner: &str, input: CreateChannelDto) -> AppResult<CustomChannel>;
    async fn update(
        &self,
        owner: &str,
        name: &str,
        input: UpdateChannelDto,
    ) -> AppResult<CustomChannel>;
    async fn delete(&self, owner: &str, name: &str) -> AppResult<()>;
}

fn invalid_clear_key() -> Error {
    let mut errors = ValidationErrors::new();
    errors.add(
        "clearKey",
        ValidationError::new("clear_key_format")
            .with_message("expected keyId:key, e.g. 436b69f987924fcbbc06d40a69c2799a:c63d5b0d7e52335b61aeba4f6537d54d".into()),
    );
    Error::ValidationError(errors)
}

/// resolves the clear key input into the stored map, only mpd streams keep one
fn resolve_clear_key(
    stream_type: StreamType,
    input: Option<ClearKeyInput>,
) -> AppResult<Option<BTreeMap<String, String>>> {
    if stream_type != StreamType::Mpd {
        return Ok(None);
    }

    match input {
        None => Ok(None),
        Some(ClearKeyInput::Text(raw)) if raw.trim().is_empty() => Ok(None),
        Some(ClearKeyInput::Text(raw)) => parse_clear_key(&raw).map(Some).ok_or_else(invalid_clear_key),
        Some(ClearKeyInput::Map(map)) if map.is_empty() => Ok(None),
        Some(ClearKeyInput::Map(map)) => {
            if map.iter().any(|(k, v)| k.trim().is_empty() || v.trim().is_empty()) {
                return Err(invalid_clear_key());
            }
            Ok(Some(map))
        }
    }
}

/// fills in the youtube embed fields, or clears them for non youtube streams
fn apply_youtube_fields(channel: &mut CustomChannel) {
    if channel.stream_type != StreamType::Youtube {
        channel.embed_url = None;
        channel.youtube_channel_id = None;
        channel.has_multiple_streams = false;
        return;
    }

    let embed = youtube_embed(&channel.manifest_uri);
    channel.embed_url = Some(embed.embed_url);
    channel.youtube_channel_id = embed.channel_id;
    channel.has_multiple_streams = embed.has_multiple_streams;
}

fn already_exists(name: &str) -> Error {
    Error::Conflict(format!("Channel '{}' already exists", name))
}

fn category_or_default(category: Option<String>) -> String {
    category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

/// custom channel persistence
///
/// writes go to the primary store (redis) when there is one, reads that fail there fall back to
/// the local store so the channel list still renders while redis is having a bad day
pub struct ChannelsService {
    primary: Option<DynChannelRepository>,
    local: DynChannelRepository,
}

impl ChannelsService {
    pub fn new(primary: Option<DynChannelRepository>, local: DynChannelRepository) -> Self {
        Self { primary, local }
    }

    fn writer(&self) -> &DynChannelRepository {
        self.primary.as_ref().unwrap_or(&self.local)
    }

    async fn read_all(&self, owner: &str) -> AppResult<Vec<CustomChannel>> {
        if let Some(primary) = &self.primary {
            match primary.list_channels(owner).await {
                Ok(channels) => return Ok(channels),
                Err(e) => warn!("Primary channel store failed, reading local: {:#}", e),
            }
        }

        Ok(self.local.list_channels(owner).await?)
    }

    async fn read_one(&self, owner: &str, name: &str) -> AppResult<Option<CustomChannel>> {
        if let Some(primary) = &self.primary {
            match primary.get_channel(owner, name).await {
                Ok(channel) => return Ok(channel),
                Err(e) => warn!("Primary channel store failed, reading local: {:#}", e),
            }
        }

        Ok(self.local.get_channel(owner, name).await?)
    }
}

#[async_trait]
impl ChannelsServiceTrait for ChannelsService {
    async fn list(&self, owner: &str) -> AppResult<Vec<CustomChannel>> {
        self.read_all(owner).await
    }

    async fn add(&self, owner: &str, input: CreateChannelDto) -> AppResult<CustomChannel> {
        let name = input.name.trim().to_string();

        let mut channel = CustomChannel {
            id: nanoid::nanoid!(),
            name,
            manifest_uri: input.manifest_uri.trim().to_string(),
            stream_type: input.stream_type,
            logo: input.logo.trim().to_string(),
            category: category_or_default(input.category),
            clear_key: resolve_clear_key(input.stream_type, input.clear_key)?,
            embed_url: None,
            youtube_channel_id: None,
            has_multiple_streams: false,
            created_at: Utc::now(),
        };
        apply_youtube_fields(&mut channel);

        // the store claims the name, a concurrent add of the same name loses here
        if !self.writer().insert_channel(owner, &channel).await? {
            return Err(already_exists(&channel.name));
        }
        info!("Channel '{}' added for {}", channel.name, owner);

        Ok(channel)
    }

    async fn update(
        &self,
        owner: &str,
        name: &str,
        input: UpdateChannelDto,
    ) -> AppResult<CustomChannel> {
        let existing = self
            .read_one(owner, name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Channel '{}' not found", name)))?;

        let mut channel = existing.clone();

        if let Some(new_name) = input.name.map(|n| n.trim().to_string()) {
            channel.name = new_name;
        }
        if let Some(manifest_uri) = input.manifest_uri {
            channel.manifest_uri = manifest_uri.trim().to_string();
        }
        if let Some(stream_type) = input.stream_type {
            channel.stream_type = stream_type;
        }
        if let Some(logo) = input.logo {
            channel.logo = logo.trim().to_string();
        }
        if input.category.is_some() {
            channel.category = category_or_default(input.category);
        }

        // a new key replaces the old one, otherwise the stored key survives as long as the
        // channel is still mpd
        channel.clear_key = match input.clear_key {
            Some(clear_key) => resolve_clear_key(channel.stream_type, Some(clear_key))?,
            None if channel.stream_type == StreamType::Mpd => existing.clear_key.clone(),
            None => None,
        };

        apply_youtube_fields(&mut channel);
        // an explicit embed url wins over the derived one
        if channel.stream_type == StreamType::Youtube {
            if let Some(embed_url) = input.embed_url.filter(|e| !e.trim().is_empty()) {
                channel.embed_url = Some(embed_url.trim().to_string());
            }
        }

        if channel.name == existing.name {
            self.writer().save_channel(owner, &channel).await?;
        } else if !self
            .writer()
            .replace_channel(owner, &existing.name, &channel)
            .await?
        {
            return Err(already_exists(&channel.name));
        }

        info!("Channel '{}' updated for {}", channel.name, owner);
        Ok(channel)
    }

    async fn delete(&self, owner: &str, name: &str) -> AppResult<()> {
        let deleted = self.writer().delete_channel(owner, name).await?;

        if deleted {
            info!("Channel '{}' deleted for {}", name, owner);
        }

        Ok(())
    }
}
