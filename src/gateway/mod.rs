//! Gateway discovery (§4.1): pluggable sources of an ordered gateway list.
//!
//! Modeled the way the teacher's `GraphGateway` trait abstracts over
//! Graph API backends — a small async trait with one behavioral method,
//! implemented by a handful of concrete, independently testable types.

pub mod routing;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

/// Hardcoded trusted fallback gateways, used when a `NetworkProvider` call
/// resolves fewer than 3 valid URLs (§4.1).
pub const HARDCODED_TRUSTED_GATEWAYS: &[&str] = &[
    "https://arweave.net",
    "https://permagate.io",
    "https://ar-io.dev",
];

pub const NETWORK_RETRY_ATTEMPTS: u32 = 5;
pub const NETWORK_RETRY_BASE_DELAY_MS: u64 = 200;

/// A candidate gateway entry, ranked by the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEntry {
    pub url: String,
    pub stake: u64,
}

/// `get_gateways() -> sequence<URL>`, failing with a gateway-classed error
/// if the underlying source is unreachable after retries (§4.1).
#[async_trait]
pub trait GatewayProvider: Send + Sync {
    async fn get_gateways(&self) -> Result<Vec<String>>;
}

/// A URL is valid iff scheme is `https`, host is non-empty, and it does not
/// contain `localhost` or the literal string `undefined` (§4.1).
pub fn is_valid_gateway_url(candidate: &str) -> bool {
    let Ok(parsed) = Url::parse(candidate) else {
        return false;
    };
    if parsed.scheme() != "https" {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    if host.is_empty() {
        return false;
    }
    if candidate.contains("localhost") || candidate.contains("undefined") {
        return false;
    }
    true
}

/// Minimal client for the gateway-address registry. The wire format of the
/// registry service is external to this engine (§1); this trait is the
/// seam a real registry client implements.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn fetch_gateways(&self) -> Result<Vec<GatewayEntry>>;
}

/// Top-N gateways from the registry, sorted by stake descending, wrapped
/// in exponential-backoff retry. Falls back to the hardcoded trusted list
/// if fewer than 3 valid URLs result (§4.1).
pub struct NetworkProvider {
    registry: Arc<dyn RegistryClient>,
    top_n: usize,
}

impl NetworkProvider {
    pub fn new(registry: Arc<dyn RegistryClient>, top_n: usize) -> Self {
        Self { registry, top_n }
    }

    async fn fetch_with_retry(&self) -> Result<Vec<GatewayEntry>> {
        let mut attempt = 0u32;
        loop {
            match self.registry.fetch_gateways().await {
                Ok(entries) => return Ok(entries),
                Err(e) if attempt + 1 >= NETWORK_RETRY_ATTEMPTS => return Err(e),
                Err(_) => {
                    let delay = NETWORK_RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl GatewayProvider for NetworkProvider {
    async fn get_gateways(&self) -> Result<Vec<String>> {
        let mut entries = self.fetch_with_retry().await?;
        entries.sort_by(|a, b| b.stake.cmp(&a.stake));
        let valid: Vec<String> = entries
            .into_iter()
            .map(|e| e.url)
            .filter(|u| is_valid_gateway_url(u))
            .take(self.top_n)
            .collect();

        if valid.len() < 3 {
            tracing::warn!(
                found = valid.len(),
                "network provider returned fewer than 3 valid gateways, falling back"
            );
            return Ok(HARDCODED_TRUSTED_GATEWAYS
                .iter()
                .map(|s| s.to_string())
                .collect());
        }
        Ok(valid)
    }
}

/// A fixed sequence of gateways.
pub struct StaticProvider {
    gateways: Vec<String>,
}

impl StaticProvider {
    pub fn new(gateways: Vec<String>) -> Self {
        Self { gateways }
    }
}

#[async_trait]
impl GatewayProvider for StaticProvider {
    async fn get_gateways(&self) -> Result<Vec<String>> {
        Ok(self.gateways.clone())
    }
}

struct CacheEntry {
    gateways: Vec<String>,
    expires_at: Instant,
}

/// Wraps another provider, caching its result for `ttl` and returning the
/// cached list until expiry (§4.1).
pub struct SimpleCacheProvider {
    inner: Arc<dyn GatewayProvider>,
    ttl: Duration,
    cache: RwLock<Option<CacheEntry>>,
}

impl SimpleCacheProvider {
    pub fn new(inner: Arc<dyn GatewayProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: RwLock::new(None),
        }
    }
}

#[async_trait]
impl GatewayProvider for SimpleCacheProvider {
    async fn get_gateways(&self) -> Result<Vec<String>> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.expires_at > Instant::now() {
                    return Ok(entry.gateways.clone());
                }
            }
        }

        let gateways = self.inner.get_gateways().await?;
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            gateways: gateways.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(gateways)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRegistry {
        entries: Vec<GatewayEntry>,
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn fetch_gateways(&self) -> Result<Vec<GatewayEntry>> {
            Ok(self.entries.clone())
        }
    }

    #[test]
    fn rejects_non_https_and_localhost_and_undefined() {
        assert!(!is_valid_gateway_url("http://example.com"));
        assert!(!is_valid_gateway_url("https://localhost"));
        assert!(!is_valid_gateway_url("https://undefined"));
        assert!(!is_valid_gateway_url("not a url"));
        assert!(is_valid_gateway_url("https://arweave.net"));
    }

    #[tokio::test]
    async fn network_provider_sorts_by_stake_descending() {
        let registry = Arc::new(FakeRegistry {
            entries: vec![
                GatewayEntry {
                    url: "https://low.example.com".to_string(),
                    stake: 1,
                },
                GatewayEntry {
                    url: "https://high.example.com".to_string(),
                    stake: 100,
                },
                GatewayEntry {
                    url: "https://mid.example.com".to_string(),
                    stake: 50,
                },
            ],
        });
        let provider = NetworkProvider::new(registry, 10);
        let gateways = provider.get_gateways().await.unwrap();
        assert_eq!(
            gateways,
            vec![
                "https://high.example.com",
                "https://mid.example.com",
                "https://low.example.com",
            ]
        );
    }

    #[tokio::test]
    async fn network_provider_falls_back_when_too_few_valid() {
        let registry = Arc::new(FakeRegistry {
            entries: vec![GatewayEntry {
                url: "https://only-one.example.com".to_string(),
                stake: 1,
            }],
        });
        let provider = NetworkProvider::new(registry, 10);
        let gateways = provider.get_gateways().await.unwrap();
        assert_eq!(gateways.len(), HARDCODED_TRUSTED_GATEWAYS.len());
    }

    #[tokio::test]
    async fn simple_cache_provider_returns_cached_value_until_ttl() {
        let provider = StaticProvider::new(vec!["https://a.example.com".to_string()]);
        let cached = SimpleCacheProvider::new(Arc::new(provider), Duration::from_millis(50));
        let first = cached.get_gateways().await.unwrap();
        assert_eq!(first, vec!["https://a.example.com".to_string()]);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let second = cached.get_gateways().await.unwrap();
        assert_eq!(second, vec!["https://a.example.com".to_string()]);
    }
}
