//! Content cache (§4.4): two maps — a resolved-URL cache and a fetched
//! content cache — each entry TTL'd at 1 hour, evicted down to the 50 most
//! recently used entries when that cap is exceeded, with cleanup sweeps
//! throttled to at most once every 5 minutes.

use crate::model::{CachedContent, VerificationStatus};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const TTL: Duration = Duration::from_secs(60 * 60);
pub const MAX_ENTRIES: usize = 50;
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct UrlEntry {
    url: String,
    inserted_at: Instant,
    last_used: Instant,
}

struct ContentEntry {
    content: CachedContent,
    inserted_at: Instant,
    last_used: Instant,
}

pub struct ContentCache {
    url_cache: RwLock<HashMap<String, UrlEntry>>,
    content_cache: RwLock<HashMap<String, ContentEntry>>,
    last_cleanup: RwLock<Instant>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self {
            url_cache: RwLock::new(HashMap::new()),
            content_cache: RwLock::new(HashMap::new()),
            last_cleanup: RwLock::new(Instant::now()),
        }
    }

    pub async fn get_url(&self, cache_key: &str) -> Option<String> {
        let mut cache = self.url_cache.write().await;
        let entry = cache.get_mut(cache_key)?;
        if entry.inserted_at.elapsed() >= TTL {
            cache.remove(cache_key);
            return None;
        }
        entry.last_used = Instant::now();
        Some(entry.url.clone())
    }

    pub async fn put_url(&self, cache_key: String, url: String) {
        let now = Instant::now();
        {
            let mut cache = self.url_cache.write().await;
            cache.insert(
                cache_key,
                UrlEntry {
                    url,
                    inserted_at: now,
                    last_used: now,
                },
            );
            evict_if_over_capacity(&mut cache, |e| e.last_used);
        }
        self.maybe_cleanup().await;
    }

    pub async fn get_content(&self, cache_key: &str) -> Option<CachedContent> {
        let mut cache = self.content_cache.write().await;
        let entry = cache.get_mut(cache_key)?;
        if entry.inserted_at.elapsed() >= TTL {
            cache.remove(cache_key);
            return None;
        }
        entry.last_used = Instant::now();
        Some(entry.content.clone())
    }

    pub async fn put_content(&self, cache_key: String, content: CachedContent) {
        let now = Instant::now();
        {
            let mut cache = self.content_cache.write().await;
            cache.insert(
                cache_key,
                ContentEntry {
                    content,
                    inserted_at: now,
                    last_used: now,
                },
            );
            evict_if_over_capacity(&mut cache, |e| e.last_used);
        }
        self.maybe_cleanup().await;
    }

    /// Update the verification status of every cached content entry whose
    /// key starts with `tx_id_prefix`, leaving the rest of the entry intact.
    pub async fn update_verification_status(&self, tx_id_prefix: &str, next: VerificationStatus) {
        let mut cache = self.content_cache.write().await;
        for (key, entry) in cache.iter_mut() {
            if key.starts_with(tx_id_prefix) {
                entry.content.verification_status.apply(next.clone());
                entry.content.verified =
                    entry.content.verification_status.status == crate::model::VerificationState::Verified;
            }
        }
    }

    async fn maybe_cleanup(&self) {
        {
            let mut last = self.last_cleanup.write().await;
            if last.elapsed() < MIN_CLEANUP_INTERVAL {
                return;
            }
            *last = Instant::now();
        }
        let now = Instant::now();
        let mut url_cache = self.url_cache.write().await;
        url_cache.retain(|_, e| now.duration_since(e.inserted_at) < TTL);
        let mut content_cache = self.content_cache.write().await;
        content_cache.retain(|_, e| now.duration_since(e.inserted_at) < TTL);
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new()
    }
}

fn evict_if_over_capacity<V>(cache: &mut HashMap<String, V>, last_used: impl Fn(&V) -> Instant) {
    if cache.len() <= MAX_ENTRIES {
        return;
    }
    let mut entries: Vec<(String, Instant)> = cache
        .iter()
        .map(|(k, v)| (k.clone(), last_used(v)))
        .collect();
    entries.sort_by_key(|(_, used)| *used);
    let overflow = cache.len() - MAX_ENTRIES;
    for (key, _) in entries.into_iter().take(overflow) {
        cache.remove(&key);
    }
}
