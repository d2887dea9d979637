use std::collections::BTreeMap;

use serde::Deserialize;
use validator::Validate;

use crate::database::channel::StreamType;

use super::non_blank;

/// the web form sends "keyId:key", older clients already send the parsed map
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClearKeyInput {
    Text(String),
    Map(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelDto {
    #[validate(length(max = 200), custom(function = "non_blank"))]
    pub name: String,
    #[validate(length(max = 4096), custom(function = "non_blank"))]
    pub manifest_uri: String,
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    #[validate(length(max = 4096), custom(function = "non_blank"))]
    pub logo: String,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub clear_key: Option<ClearKeyInput>,
}

/// partial update, missing fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChannelDto {
    #[validate(length(max = 200), custom(function = "non_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 4096), custom(function = "non_blank"))]
    pub manifest_uri: Option<String>,
    #[serde(rename = "type")]
    pub stream_type: Option<StreamType>,
    #[validate(length(max = 4096), custom(function = "non_blank"))]
    pub logo: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub clear_key: Option<ClearKeyInput>,
    pub embed_url: Option<String>,
}
