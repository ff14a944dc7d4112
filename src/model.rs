//! Core data model: transactions, channels, content requests/responses and
//! verification status, per §3.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A media filter over the block space. `(media, recency)` is the identity
/// used by the sliding-window position map in `FetchQueue`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub media: Media,
    pub recency: Recency,
    pub owner_address: Option<String>,
    pub app_name: Option<String>,
}

impl Channel {
    pub fn new(media: Media, recency: Recency) -> Self {
        Self {
            media,
            recency,
            owner_address: None,
            app_name: None,
        }
    }

    /// The `(media, recency)` identity used to key window positions.
    pub fn window_key(&self) -> (Media, Recency) {
        (self.media, self.recency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Media {
    Images,
    Videos,
    Music,
    Websites,
    Text,
    Arfs,
    Arns,
    Everything,
}

impl Media {
    /// Content-Type tag values accepted for this media, per §6.
    pub fn content_types(&self) -> &'static [&'static str] {
        match self {
            Media::Images => &[
                "image/png",
                "image/jpeg",
                "image/webp",
                "image/gif",
                "image/svg+xml",
                "image/avif",
            ],
            Media::Videos => &["video/mp4", "video/webm", "video/ogg"],
            Media::Music => &[
                "audio/mpeg",
                "audio/mp3",
                "audio/wav",
                "audio/ogg",
                "audio/webm",
                "audio/mp4",
                "audio/flac",
            ],
            Media::Websites => &[
                "application/x.arweave-manifest+json",
                "text/html",
                "application/xhtml+xml",
            ],
            Media::Text => &["text/markdown", "application/pdf"],
            Media::Arfs => &["application/json"],
            Media::Arns => &[],
            Media::Everything => &[
                "image/png",
                "image/jpeg",
                "image/webp",
                "image/gif",
                "image/svg+xml",
                "image/avif",
                "video/mp4",
                "video/webm",
                "video/ogg",
                "audio/mpeg",
                "audio/mp3",
                "audio/wav",
                "audio/ogg",
                "audio/webm",
                "audio/mp4",
                "audio/flac",
                "application/x.arweave-manifest+json",
                "text/html",
                "application/xhtml+xml",
                "text/markdown",
                "application/pdf",
            ],
        }
    }

    /// Size threshold in bytes past which content is returned URL-only, per §6.
    pub fn size_threshold(&self) -> Option<u64> {
        const MIB: u64 = 1024 * 1024;
        match self {
            Media::Images => Some(25 * MIB),
            Media::Videos => Some(200 * MIB),
            Media::Music => Some(50 * MIB),
            Media::Text => Some(10 * MIB),
            Media::Websites | Media::Arfs | Media::Arns | Media::Everything => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recency {
    New,
    Old,
}

/// `{dataTxId, name, size, contentType, customTags}`, resolved lazily and
/// attached once to a `TxMeta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArfsMeta {
    pub data_tx_id: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub custom_tags: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundledIn {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataInfo {
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub timestamp: i64,
}

/// An immutable transaction record. Never mutated after creation except to
/// attach `arfs_meta` once (§3's "append-once optional" rule, §9 open
/// question (c)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxMeta {
    pub id: String,
    pub bundled_in: Option<BundledIn>,
    pub owner: Owner,
    pub fee: String,
    pub quantity: String,
    pub tags: Vec<Tag>,
    pub data: DataInfo,
    pub block: BlockInfo,
    pub arfs_meta: Option<ArfsMeta>,
    /// Present only for ArNS placeholders (§4.8): a name to be resolved on
    /// demand, with no backing transaction yet.
    pub arns_name: Option<String>,
}

impl TxMeta {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }

    /// Return a copy of this transaction with ArFS metadata attached.
    /// `arfs_meta` is append-once: once set, further calls are ignored.
    pub fn with_arfs_meta(mut self, meta: ArfsMeta) -> Self {
        if self.arfs_meta.is_none() {
            self.arfs_meta = Some(meta);
        }
        self
    }

    pub fn arns_placeholder(name: String) -> Self {
        Self {
            id: format!("arns:{name}"),
            bundled_in: None,
            owner: Owner {
                address: String::new(),
            },
            fee: "0".to_string(),
            quantity: "0".to_string(),
            tags: Vec::new(),
            data: DataInfo { size: 0 },
            block: BlockInfo {
                height: 0,
                timestamp: 0,
            },
            arfs_meta: None,
            arns_name: Some(name),
        }
    }
}

/// A request for a transaction's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub tx_id: String,
    pub path: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub preferred_gateway: Option<String>,
}

impl ContentRequest {
    pub fn new(tx_id: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            path: None,
            content_type: None,
            size: None,
            preferred_gateway: None,
        }
    }

    /// `txId || path`, the key both cache maps use.
    pub fn cache_key(&self) -> String {
        match &self.path {
            Some(p) => format!("{}{}", self.tx_id, p),
            None => self.tx_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStage {
    Routing,
    Downloading,
    Verifying,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationProgress {
    pub processed: u32,
    pub total: u32,
    pub percent: f32,
    pub stage: VerificationStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationState {
    Pending,
    Verifying,
    Verified,
    Failed,
    NotVerified,
}

/// `{txId, status, gateway?, verificationMethod?, error?, progress?, timestamp}`.
///
/// Invariant (§3): once `Verified`, only an explicit retry to `Pending` may
/// overwrite it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationStatus {
    pub tx_id: String,
    pub status: VerificationState,
    pub gateway: Option<String>,
    pub verification_method: Option<String>,
    pub error: Option<String>,
    pub progress: Option<VerificationProgress>,
    pub timestamp: i64,
}

impl VerificationStatus {
    pub fn pending(tx_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            tx_id: tx_id.into(),
            status: VerificationState::Pending,
            gateway: None,
            verification_method: None,
            error: None,
            progress: None,
            timestamp,
        }
    }

    /// Apply `next`, enforcing that `Verified` is never silently downgraded
    /// (the one exception is an explicit reset to `Pending`, per §3/§4.3).
    pub fn apply(&mut self, next: VerificationStatus) {
        if self.status == VerificationState::Verified && next.status != VerificationState::Pending
        {
            return;
        }
        *self = next;
    }
}

/// `{url, gateway, data, contentType, verified, verificationStatus, fromCache}`.
/// `data` is `None` when the response is URL-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentResponse {
    pub url: String,
    pub gateway: String,
    pub data: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub verified: bool,
    pub verification_status: VerificationState,
    pub from_cache: bool,
}

/// The full cached payload entry, never present while `verifying`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedContent {
    pub url: String,
    pub gateway: String,
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub verified: bool,
    pub verification_status: VerificationStatus,
    pub timestamp: i64,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_status_cannot_be_downgraded_except_to_pending() {
        let mut status = VerificationStatus::pending("tx1", 0);
        status.status = VerificationState::Verified;

        let mut failed = VerificationStatus::pending("tx1", 1);
        failed.status = VerificationState::Failed;
        status.apply(failed);
        assert_eq!(status.status, VerificationState::Verified);

        let reset = VerificationStatus::pending("tx1", 2);
        status.apply(reset);
        assert_eq!(status.status, VerificationState::Pending);
    }

    #[test]
    fn arfs_meta_is_append_once() {
        let base = TxMeta::arns_placeholder("example".to_string());
        let meta = ArfsMeta {
            data_tx_id: "a".to_string(),
            name: "n".to_string(),
            size: 1,
            content_type: "application/octet-stream".to_string(),
            custom_tags: HashMap::new(),
        };
        let once = base.with_arfs_meta(meta.clone());
        let mut other = meta.clone();
        other.data_tx_id = "b".to_string();
        let twice = once.with_arfs_meta(other);
        assert_eq!(twice.arfs_meta.unwrap().data_tx_id, "a");
    }

    #[test]
    fn cache_key_includes_path() {
        let mut r = ContentRequest::new("tx1");
        assert_eq!(r.cache_key(), "tx1");
        r.path = Some("/thumb.png".to_string());
        assert_eq!(r.cache_key(), "tx1/thumb.png");
    }
}
