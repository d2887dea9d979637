use std::collections::BTreeMap;

/// embed details derived from whatever youtube link the user pasted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YoutubeEmbed {
    pub embed_url: String,
    pub channel_id: Option<String>,
    /// channel level links can be running more than one live stream at once
    pub has_multiple_streams: bool,
}

const LIVE_EMBED_PREFIX: &str = "https://www.youtube.com/embed/live_stream?channel=";

pub fn youtube_embed(manifest_uri: &str) -> YoutubeEmbed {
    let uri = manifest_uri.trim();

    if let Some((_, rest)) = uri.split_once("youtube.com/channel/") {
        let channel_id = rest
            .split(['?', '/', '#'])
            .next()
            .unwrap_or_default()
            .to_string();

        return YoutubeEmbed {
            embed_url: format!("{}{}", LIVE_EMBED_PREFIX, channel_id),
            channel_id: Some(channel_id).filter(|id| !id.is_empty()),
            has_multiple_streams: true,
        };
    }

    if uri.contains("embed/live_stream?channel=") {
        let channel_id = url::Url::parse(uri).ok().and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "channel")
                .map(|(_, value)| value.into_owned())
        });

        return YoutubeEmbed {
            embed_url: uri.to_string(),
            channel_id: channel_id.filter(|id| !id.is_empty()),
            has_multiple_streams: true,
        };
    }

    if uri.contains("youtu.be/") || uri.contains("youtube.com/watch") {
        return YoutubeEmbed {
            embed_url: uri
                .replace("youtu.be/", "www.youtube.com/embed/")
                .replace("watch?v=", "embed/"),
            channel_id: None,
            has_multiple_streams: false,
        };
    }

    YoutubeEmbed {
        embed_url: uri.to_string(),
        channel_id: None,
        has_multiple_streams: false,
    }
}

/// parses "keyId:key" into the one entry map dash players expect, None when either side is
/// missing
pub fn parse_clear_key(raw: &str) -> Option<BTreeMap<String, String>> {
    let (key_id, key) = raw.trim().split_once(':')?;
    let (key_id, key) = (key_id.trim(), key.trim());

    if key_id.is_empty() || key.is_empty() || key.contains(':') {
        return None;
    }

    Some(BTreeMap::from([(key_id.to_string(), key.to_string())]))
}
