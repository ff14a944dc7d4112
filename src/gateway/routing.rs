//! Routing strategies (§4.2): select one gateway per request from a
//! provider's candidate list.

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, RoutingEvent};
use crate::http_client::HttpClient;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Context passed to a routing strategy: the candidate list (already
/// filtered by the circuit breaker) and an optional probe path.
pub struct RoutingContext<'a> {
    pub gateways: &'a [String],
    pub probe_path: &'a str,
}

/// `resolve(arUrl) -> URL`. Implementations MUST exclude gateways the
/// circuit breaker currently marks "failed" and emit
/// `routing-started`/`routing-succeeded`/`routing-failed` on the bus.
#[async_trait]
pub trait RoutingStrategy: Send + Sync {
    async fn select(&self, ctx: RoutingContext<'_>) -> Result<String>;
}

/// Runs a `select` call through the circuit breaker + event bus plumbing
/// common to every strategy: exclude failed gateways, emit the lifecycle
/// events, and record attempts.
pub async fn resolve(
    strategy: &dyn RoutingStrategy,
    candidates: &[String],
    probe_path: &str,
    breaker: &CircuitBreaker,
    events: &EventBus,
    tx_id: &str,
) -> Result<String> {
    events.publish_routing(RoutingEvent::Started {
        tx_id: tx_id.to_string(),
    });

    let eligible = breaker.filter_eligible(candidates);
    if eligible.is_empty() {
        let err = Error::Gateway("no eligible gateways (all circuit-broken)".to_string());
        events.publish_routing(RoutingEvent::Failed {
            tx_id: tx_id.to_string(),
            error: err.to_string(),
        });
        return Err(err);
    }

    let ctx = RoutingContext {
        gateways: &eligible,
        probe_path,
    };

    match strategy.select(ctx).await {
        Ok(gateway) => {
            breaker.record_attempt(&gateway);
            events.publish_routing(RoutingEvent::Succeeded {
                tx_id: tx_id.to_string(),
                selected_gateway: gateway.clone(),
            });
            Ok(gateway)
        }
        Err(e) => {
            events.publish_routing(RoutingEvent::Failed {
                tx_id: tx_id.to_string(),
                error: e.to_string(),
            });
            Err(e)
        }
    }
}

/// Uniform choice from the provider list.
pub struct RandomStrategy;

#[async_trait]
impl RoutingStrategy for RandomStrategy {
    async fn select(&self, ctx: RoutingContext<'_>) -> Result<String> {
        ctx.gateways
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| Error::Gateway("no gateways to choose from".to_string()))
    }
}

/// Process-local monotonic counter modulo list length.
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoutingStrategy for RoundRobinStrategy {
    async fn select(&self, ctx: RoutingContext<'_>) -> Result<String> {
        if ctx.gateways.is_empty() {
            return Err(Error::Gateway("no gateways to choose from".to_string()));
        }
        let i = self.counter.fetch_add(1, Ordering::Relaxed) % ctx.gateways.len();
        Ok(ctx.gateways[i].clone())
    }
}

/// Always returns a configured URL, ignoring the candidate list.
pub struct StaticStrategy {
    gateway: String,
}

impl StaticStrategy {
    pub fn new(gateway: String) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl RoutingStrategy for StaticStrategy {
    async fn select(&self, _ctx: RoutingContext<'_>) -> Result<String> {
        Ok(self.gateway.clone())
    }
}

/// Returns the configured preferred URL; on routing failure from that
/// gateway, falls back to `Random` among the remaining candidates.
pub struct PreferredFallbackStrategy {
    preferred: String,
}

impl PreferredFallbackStrategy {
    pub fn new(preferred: String) -> Self {
        Self { preferred }
    }
}

#[async_trait]
impl RoutingStrategy for PreferredFallbackStrategy {
    async fn select(&self, ctx: RoutingContext<'_>) -> Result<String> {
        if ctx.gateways.iter().any(|g| g == &self.preferred) {
            return Ok(self.preferred.clone());
        }
        RandomStrategy.select(ctx).await
    }
}

/// Issues parallel HEAD probes to `probe_path` with a timeout; returns the
/// first OK responder.
pub struct FastestPingStrategy {
    client: HttpClient,
    timeout: Duration,
}

impl FastestPingStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: HttpClient::new(),
            timeout,
        }
    }
}

#[async_trait]
impl RoutingStrategy for FastestPingStrategy {
    async fn select(&self, ctx: RoutingContext<'_>) -> Result<String> {
        if ctx.gateways.is_empty() {
            return Err(Error::Gateway("no gateways to choose from".to_string()));
        }

        let probes = ctx.gateways.iter().map(|gateway| {
            let url = format!("{}{}", gateway.trim_end_matches('/'), ctx.probe_path);
            let gateway = gateway.clone();
            let client = &self.client;
            let timeout = self.timeout;
            async move {
                client
                    .head(&url, timeout)
                    .await
                    .map(|_| gateway)
            }
        });

        match futures::future::select_ok(probes).await {
            Ok((gateway, _)) => Ok(gateway),
            Err(_) => Err(Error::Gateway(
                "no gateway responded to the ping probe".to_string(),
            )),
        }
    }
}

struct PingCacheEntry {
    gateway: String,
    expires_at: Instant,
}

/// Wraps a `FastestPing`-style strategy with a 15-minute TTL cache so the
/// selected gateway is reused across requests (§4.2).
pub struct SimpleCacheRoutingStrategy {
    inner: Arc<dyn RoutingStrategy>,
    ttl: Duration,
    cache: RwLock<Option<PingCacheEntry>>,
}

impl SimpleCacheRoutingStrategy {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

    pub fn new(inner: Arc<dyn RoutingStrategy>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: RwLock::new(None),
        }
    }
}

#[async_trait]
impl RoutingStrategy for SimpleCacheRoutingStrategy {
    async fn select(&self, ctx: RoutingContext<'_>) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.expires_at > Instant::now() && ctx.gateways.contains(&entry.gateway) {
                    return Ok(entry.gateway.clone());
                }
            }
        }

        let gateway = self.inner.select(ctx).await?;
        let mut cache = self.cache.write().await;
        *cache = Some(PingCacheEntry {
            gateway: gateway.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(gateway)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(gateways: &'a [String]) -> RoutingContext<'a> {
        RoutingContext {
            gateways,
            probe_path: "/ping",
        }
    }

    #[tokio::test]
    async fn round_robin_cycles_through_candidates() {
        let strategy = RoundRobinStrategy::new();
        let gateways = vec!["https://a".to_string(), "https://b".to_string()];
        let first = strategy.select(ctx(&gateways)).await.unwrap();
        let second = strategy.select(ctx(&gateways)).await.unwrap();
        let third = strategy.select(ctx(&gateways)).await.unwrap();
        assert_eq!(first, "https://a");
        assert_eq!(second, "https://b");
        assert_eq!(third, "https://a");
    }

    #[tokio::test]
    async fn static_strategy_ignores_candidates() {
        let strategy = StaticStrategy::new("https://fixed".to_string());
        let gateways = vec!["https://a".to_string()];
        assert_eq!(strategy.select(ctx(&gateways)).await.unwrap(), "https://fixed");
    }

    #[tokio::test]
    async fn preferred_fallback_uses_preferred_when_present() {
        let strategy = PreferredFallbackStrategy::new("https://b".to_string());
        let gateways = vec!["https://a".to_string(), "https://b".to_string()];
        assert_eq!(strategy.select(ctx(&gateways)).await.unwrap(), "https://b");
    }

    #[tokio::test]
    async fn preferred_fallback_falls_back_to_random_when_absent() {
        let strategy = PreferredFallbackStrategy::new("https://missing".to_string());
        let gateways = vec!["https://a".to_string()];
        assert_eq!(strategy.select(ctx(&gateways)).await.unwrap(), "https://a");
    }

    #[tokio::test]
    async fn resolve_excludes_circuit_broken_gateways() {
        let breaker = CircuitBreaker::new();
        breaker.record_failure("https://a");
        let events = EventBus::new();
        let gateways = vec!["https://a".to_string(), "https://b".to_string()];
        let strategy = RoundRobinStrategy::new();
        let selected = resolve(&strategy, &gateways, "/ping", &breaker, &events, "tx1")
            .await
            .unwrap();
        assert_eq!(selected, "https://b");
    }
}
