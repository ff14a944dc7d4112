//! Deep-link descriptor parsing (§6): the initial-request shape a host
//! passes in via URL query parameters.

use crate::model::{Channel, Media, Recency};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeepLinkRequest {
    pub tx_id: Option<String>,
    pub owner_address: Option<String>,
    pub app_name: Option<String>,
    pub min_block: Option<u64>,
    pub max_block: Option<u64>,
    pub channel: Option<Media>,
}

impl DeepLinkRequest {
    pub fn is_empty(&self) -> bool {
        *self == DeepLinkRequest::default()
    }

    /// Build the `Channel` this descriptor implies, defaulting recency to
    /// `new` since a deep link names no recency of its own.
    pub fn channel(&self) -> Option<Channel> {
        let media = self.channel?;
        Some(Channel {
            media,
            recency: Recency::New,
            owner_address: self.owner_address.clone(),
            app_name: self.app_name.clone(),
        })
    }
}

fn parse_media(value: &str) -> Option<Media> {
    match value {
        "images" => Some(Media::Images),
        "videos" => Some(Media::Videos),
        "music" => Some(Media::Music),
        "websites" => Some(Media::Websites),
        "text" => Some(Media::Text),
        "arfs" => Some(Media::Arfs),
        "arns" => Some(Media::Arns),
        "everything" => Some(Media::Everything),
        _ => None,
    }
}

/// Parse query parameters into a `DeepLinkRequest`. Unknown parameters are
/// ignored, per §6.
pub fn parse_query(params: &HashMap<String, String>) -> DeepLinkRequest {
    DeepLinkRequest {
        tx_id: params.get("txid").cloned(),
        owner_address: params.get("ownerAddress").cloned(),
        app_name: params.get("appName").cloned(),
        min_block: params.get("minBlock").and_then(|v| v.parse().ok()),
        max_block: params.get("maxBlock").and_then(|v| v.parse().ok()),
        channel: params.get("channel").and_then(|v| parse_media(v)),
    }
}

/// Parse a full deep-link URL's query string.
pub fn parse_url(url: &str) -> DeepLinkRequest {
    let Ok(parsed) = url::Url::parse(url) else {
        return DeepLinkRequest::default();
    };
    let params: HashMap<String, String> = parsed
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    parse_query(&params)
}

/// Render a shareable deep-link URL for the current view, the inverse of
/// `parse_url` up to block-range normalization (§8).
pub fn share_url(base: &str, tx_id: &str, channel: &Channel, min_block: u64, max_block: u64) -> String {
    let mut url = url::Url::parse(base).unwrap_or_else(|_| url::Url::parse("https://roam.invalid").unwrap());
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("txid", tx_id);
        query.append_pair("channel", media_name(channel.media));
        query.append_pair("minBlock", &min_block.to_string());
        query.append_pair("maxBlock", &max_block.to_string());
        if let Some(owner) = &channel.owner_address {
            query.append_pair("ownerAddress", owner);
        }
        if let Some(app) = &channel.app_name {
            query.append_pair("appName", app);
        }
    }
    url.to_string()
}

fn media_name(media: Media) -> &'static str {
    match media {
        Media::Images => "images",
        Media::Videos => "videos",
        Media::Music => "music",
        Media::Websites => "websites",
        Media::Text => "text",
        Media::Arfs => "arfs",
        Media::Arns => "arns",
        Media::Everything => "everything",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_params_and_ignores_unknown() {
        let mut params = HashMap::new();
        params.insert("txid".to_string(), "ABC".to_string());
        params.insert("channel".to_string(), "text".to_string());
        params.insert("minBlock".to_string(), "500000".to_string());
        params.insert("maxBlock".to_string(), "600000".to_string());
        params.insert("mystery".to_string(), "ignored".to_string());

        let parsed = parse_query(&params);
        assert_eq!(parsed.tx_id.as_deref(), Some("ABC"));
        assert_eq!(parsed.channel, Some(Media::Text));
        assert_eq!(parsed.min_block, Some(500_000));
        assert_eq!(parsed.max_block, Some(600_000));
    }

    #[test]
    fn empty_params_is_empty_request() {
        let parsed = parse_query(&HashMap::new());
        assert!(parsed.is_empty());
    }

    #[test]
    fn share_url_round_trips_through_parse_url() {
        let channel = Channel::new(Media::Images, Recency::New);
        let url = share_url("https://roam.example.com/", "ABC", &channel, 100, 200);
        let parsed = parse_url(&url);
        assert_eq!(parsed.tx_id.as_deref(), Some("ABC"));
        assert_eq!(parsed.channel, Some(Media::Images));
        assert_eq!(parsed.min_block, Some(100));
        assert_eq!(parsed.max_block, Some(200));
    }
}
