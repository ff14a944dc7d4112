//! The orchestrator (§4.6): resolves a gateway, fetches, optionally
//! verifies, caches, emits events, and retries with gateway-class-aware
//! backoff for each `ContentRequest`.

use crate::cache::ContentCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::WayfinderConfig;
use crate::error::{Error, ErrorClass, Result};
use crate::event_bus::EventBus;
use crate::gateway::routing::{resolve as resolve_gateway, RoutingStrategy};
use crate::gateway::GatewayProvider;
use crate::http_client::HttpClient;
use crate::model::{CachedContent, ContentRequest, ContentResponse, VerificationState, VerificationStatus};
use crate::verification::VerificationEngine;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

pub const MAX_ATTEMPTS: u32 = 5;
pub const BACKOFF_CAP: Duration = Duration::from_secs(2);
pub const JITTER_FRACTION: f64 = 0.1;

fn base_delay_for(class: ErrorClass) -> Duration {
    match class {
        ErrorClass::Gateway => Duration::from_millis(100),
        ErrorClass::Network => Duration::from_millis(200),
        ErrorClass::Timeout => Duration::from_millis(150),
        _ => Duration::from_millis(300),
    }
}

fn backoff_for(class: ErrorClass, attempt: u32) -> Duration {
    let base = base_delay_for(class).as_millis() as f64;
    let exp = base * 2f64.powi(attempt as i32);
    let jitter = 1.0 + rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let millis = (exp * jitter).min(BACKOFF_CAP.as_millis() as f64);
    Duration::from_millis(millis as u64)
}

pub struct Wayfinder {
    config: WayfinderConfig,
    gateway_provider: Arc<dyn GatewayProvider>,
    routing_strategy: Arc<dyn RoutingStrategy>,
    verification: Option<Arc<VerificationEngine>>,
    cache: ContentCache,
    breaker: CircuitBreaker,
    events: EventBus,
    client: HttpClient,
    initialized: OnceCell<()>,
}

impl Wayfinder {
    pub fn new(
        config: WayfinderConfig,
        gateway_provider: Arc<dyn GatewayProvider>,
        routing_strategy: Arc<dyn RoutingStrategy>,
        verification: Option<Arc<VerificationEngine>>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            gateway_provider,
            routing_strategy,
            verification,
            cache: ContentCache::new(),
            breaker: CircuitBreaker::new(),
            events,
            client: HttpClient::new(),
            initialized: OnceCell::new(),
        }
    }

    /// Lazy, idempotent initialization shared by all concurrent callers
    /// (§4.6's "single in-flight initialization promise").
    async fn ensure_initialized(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                if !self.config.enable_wayfinder {
                    return Err(Error::Initialization("wayfinder disabled by config".to_string()));
                }
                match self.gateway_provider.get_gateways().await {
                    Ok(_) => Ok(()),
                    Err(e) => Err(Error::Initialization(format!("gateway provider init failed: {e}"))),
                }
            })
            .await
            .map(|_| ())
    }

    fn fallback_gateway(&self) -> String {
        self.config
            .fallback
            .gateways
            .first()
            .cloned()
            .unwrap_or_else(|| "https://arweave.net".to_string())
    }

    fn fallback_response(&self, request: &ContentRequest, reason: &str) -> ContentResponse {
        let gateway = request.preferred_gateway.clone().unwrap_or_else(|| self.fallback_gateway());
        let path = request.path.clone().unwrap_or_else(|| format!("/{}", request.tx_id));
        tracing::warn!(tx_id = %request.tx_id, reason, "wayfinder falling back without routing pipeline");
        ContentResponse {
            url: format!("{}{}", gateway.trim_end_matches('/'), path),
            gateway,
            data: None,
            content_type: request.content_type.clone(),
            verified: false,
            verification_status: VerificationState::NotVerified,
            from_cache: false,
        }
    }

    /// `get_content(request, force_load?, preload?) -> ContentResponse`,
    /// following the decision order of §4.6.
    pub async fn get_content(
        &self,
        request: &ContentRequest,
        force_load: bool,
        preload: bool,
        now: i64,
    ) -> Result<ContentResponse> {
        let cache_key = request.cache_key();
        let path = request.path.clone().unwrap_or_else(|| format!("/{}", request.tx_id));

        // 1. Size gate.
        if !force_load {
            if let (Some(content_type), Some(size)) = (&request.content_type, request.size) {
                if let Some(threshold) = size_threshold_for_content_type(content_type) {
                    if size > threshold {
                        return Ok(self.url_only_response(request, &path, now).await);
                    }
                }
            }
        }

        // 2. Fresh contentCache entry.
        if let Some(cached) = self.cache.get_content(&cache_key).await {
            return Ok(ContentResponse {
                url: cached.url,
                gateway: cached.gateway,
                data: Some(cached.data),
                content_type: cached.content_type,
                verified: cached.verified,
                verification_status: cached.verification_status.status,
                from_cache: true,
            });
        }

        // 3. Fresh urlCache entry.
        if let Some(url) = self.cache.get_url(&cache_key).await {
            let gateway = gateway_of(&url);
            return Ok(ContentResponse {
                url,
                gateway,
                data: None,
                content_type: request.content_type.clone(),
                verified: false,
                verification_status: VerificationState::NotVerified,
                from_cache: true,
            });
        }

        // 4. Preload: URL-only.
        if preload {
            return Ok(self.url_only_response(request, &path, now).await);
        }

        // 5. Lazy init.
        if self.ensure_initialized().await.is_err() || !self.config.enable_wayfinder {
            return Ok(self.fallback_response(request, "initialization failed or wayfinder disabled"));
        }

        // 6. Retry loop.
        self.breaker.clear_attempts();
        let mut attempt = 0u32;
        loop {
            match self.attempt_fetch(request, &path, &cache_key, now).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(Error::RetryExhausted {
                            source: Box::new(e),
                            attempted_gateways: self.breaker.attempted_gateways(),
                        });
                    }
                    tokio::time::sleep(backoff_for(e.class(), attempt)).await;
                }
            }
        }
    }

    async fn url_only_response(&self, request: &ContentRequest, path: &str, _now: i64) -> ContentResponse {
        if let Some(url) = self.cache.get_url(&request.cache_key()).await {
            let gateway = gateway_of(&url);
            return ContentResponse {
                url,
                gateway,
                data: None,
                content_type: request.content_type.clone(),
                verified: false,
                verification_status: VerificationState::NotVerified,
                from_cache: true,
            };
        }

        let gateways = self.gateway_provider.get_gateways().await.unwrap_or_default();
        let gateway = if gateways.is_empty() {
            self.fallback_gateway()
        } else {
            resolve_gateway(
                self.routing_strategy.as_ref(),
                &gateways,
                "/",
                &self.breaker,
                &self.events,
                &request.tx_id,
            )
            .await
            .unwrap_or_else(|_| self.fallback_gateway())
        };

        let url = format!("{}{}", gateway.trim_end_matches('/'), path);
        self.cache.put_url(request.cache_key(), url.clone()).await;

        ContentResponse {
            url,
            gateway,
            data: None,
            content_type: request.content_type.clone(),
            verified: false,
            verification_status: VerificationState::NotVerified,
            from_cache: false,
        }
    }

    async fn attempt_fetch(
        &self,
        request: &ContentRequest,
        path: &str,
        cache_key: &str,
        now: i64,
    ) -> Result<ContentResponse> {
        let gateways = self.gateway_provider.get_gateways().await?;
        let gateway = resolve_gateway(
            self.routing_strategy.as_ref(),
            &gateways,
            "/",
            &self.breaker,
            &self.events,
            &request.tx_id,
        )
        .await?;

        let url = format!("{}{}", gateway.trim_end_matches('/'), path);

        let fetch_result = self.client.get_bytes(&url, None).await;
        let data = match fetch_result {
            Ok(bytes) => bytes,
            Err(e) => {
                self.breaker.record_failure(&gateway);
                return Err(e);
            }
        };

        // The fetch itself succeeded, so the URL is cached regardless of
        // what verification decides (§4.4: urlCache populated on every
        // successful fetch).
        self.cache.put_url(cache_key.to_string(), url.clone()).await;

        let verification_enabled = self.config.verification.enabled && self.verification.is_some();
        let verification_status = if verification_enabled {
            let hash = blake3::hash(&data);
            let engine = self.verification.as_ref().unwrap();
            engine
                .verify(&request.tx_id, path, hash, &gateway, now)
                .await?
        } else {
            VerificationStatus {
                tx_id: request.tx_id.clone(),
                status: VerificationState::NotVerified,
                gateway: Some(gateway.clone()),
                verification_method: None,
                error: None,
                progress: None,
                timestamp: now,
            }
        };

        if verification_status.status == VerificationState::Failed {
            let reason = verification_status.error.clone().unwrap_or_default();
            self.cache.update_verification_status(&request.tx_id, verification_status).await;
            return Err(Error::Verification(reason));
        }

        let verified = verification_status.status == VerificationState::Verified;
        self.cache
            .put_content(
                cache_key.to_string(),
                CachedContent {
                    url: url.clone(),
                    gateway: gateway.clone(),
                    data: data.clone(),
                    content_type: request.content_type.clone(),
                    verified,
                    verification_status: verification_status.clone(),
                    timestamp: now,
                    size: data.len() as u64,
                },
            )
            .await;

        Ok(ContentResponse {
            url,
            gateway,
            data: Some(data),
            content_type: request.content_type.clone(),
            verified,
            verification_status: verification_status.status,
            from_cache: false,
        })
    }
}

fn gateway_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .map(|u| format!("{}://{}", u.scheme(), u.host_str().unwrap_or_default()))
        .unwrap_or_else(|| url.to_string())
}

fn size_threshold_for_content_type(content_type: &str) -> Option<u64> {
    use crate::model::Media;
    for media in [Media::Images, Media::Videos, Media::Music, Media::Text] {
        if media.content_types().contains(&content_type) {
            return media.size_threshold();
        }
    }
    None
}
