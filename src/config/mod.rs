//! Persisted configuration (§6, §2's `ConfigStore`): validation and
//! deep-merge over `WayfinderConfig`, backed by the external KV store.

use crate::error::{Error, Result};
use crate::kv_store::{get_json, set_json, KvStore};
use serde::{Deserialize, Serialize};

pub const CONFIG_KEY: &str = "wayfinder-config";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AoConfig {
    pub cu_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GatewayProviderConfig {
    Network { top_n: usize },
    Static { gateways: Vec<String> },
    SimpleCache { ttl_ms: u64, inner: Box<GatewayProviderConfig> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingStrategyConfig {
    pub strategy: RoutingStrategyKind,
    pub static_gateway: Option<String>,
    pub preferred_gateway: Option<String>,
    pub timeout_ms: Option<u64>,
    pub probe_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategyKind {
    Random,
    FastestPing,
    RoundRobin,
    Static,
    PreferredFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    pub gateway_provider: GatewayProviderConfig,
    pub strategy: RoutingStrategyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStrategyKind {
    Hash,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationConfig {
    pub enabled: bool,
    pub strategy: VerificationStrategyKind,
    pub gateway_provider: GatewayProviderConfig,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub gateways: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub sample_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WayfinderConfig {
    pub enable_wayfinder: bool,
    pub ao: Option<AoConfig>,
    pub routing: RoutingConfig,
    pub verification: VerificationConfig,
    pub fallback: FallbackConfig,
    pub telemetry: TelemetryConfig,
}

/// The four named bundles of provider+strategy settings (§6, SPEC_FULL §C.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    Balanced,
    Fast,
    FairShare,
    SelfHosted,
}

impl RoutingMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "balanced" => Some(Self::Balanced),
            "fast" => Some(Self::Fast),
            "fair-share" => Some(Self::FairShare),
            "self" => Some(Self::SelfHosted),
            _ => None,
        }
    }

    pub fn apply(self, config: &mut WayfinderConfig) {
        config.routing = match self {
            RoutingMode::Balanced => RoutingConfig {
                gateway_provider: GatewayProviderConfig::Network { top_n: 10 },
                strategy: RoutingStrategyConfig {
                    strategy: RoutingStrategyKind::RoundRobin,
                    static_gateway: None,
                    preferred_gateway: None,
                    timeout_ms: None,
                    probe_path: None,
                },
            },
            RoutingMode::Fast => RoutingConfig {
                gateway_provider: GatewayProviderConfig::Network { top_n: 10 },
                strategy: RoutingStrategyConfig {
                    strategy: RoutingStrategyKind::FastestPing,
                    static_gateway: None,
                    preferred_gateway: None,
                    timeout_ms: Some(2_000),
                    probe_path: Some("/ping".to_string()),
                },
            },
            RoutingMode::FairShare => RoutingConfig {
                gateway_provider: GatewayProviderConfig::Network { top_n: 10 },
                strategy: RoutingStrategyConfig {
                    strategy: RoutingStrategyKind::Random,
                    static_gateway: None,
                    preferred_gateway: None,
                    timeout_ms: None,
                    probe_path: None,
                },
            },
            RoutingMode::SelfHosted => RoutingConfig {
                gateway_provider: GatewayProviderConfig::Static {
                    gateways: config.fallback.gateways.clone(),
                },
                strategy: RoutingStrategyConfig {
                    strategy: RoutingStrategyKind::Static,
                    static_gateway: config.fallback.gateways.first().cloned(),
                    preferred_gateway: None,
                    timeout_ms: None,
                    probe_path: None,
                },
            },
        };
    }
}

impl Default for WayfinderConfig {
    fn default() -> Self {
        Self {
            enable_wayfinder: true,
            ao: None,
            routing: RoutingConfig {
                gateway_provider: GatewayProviderConfig::Network { top_n: 10 },
                strategy: RoutingStrategyConfig {
                    strategy: RoutingStrategyKind::RoundRobin,
                    static_gateway: None,
                    preferred_gateway: None,
                    timeout_ms: None,
                    probe_path: None,
                },
            },
            verification: VerificationConfig {
                enabled: true,
                strategy: VerificationStrategyKind::Hash,
                gateway_provider: GatewayProviderConfig::Network { top_n: 10 },
                timeout_ms: 30_000,
            },
            fallback: FallbackConfig {
                gateways: vec!["https://arweave.net".to_string()],
            },
            telemetry: TelemetryConfig {
                enabled: false,
                sample_rate: 0.0,
            },
        }
    }
}

/// §6's fallback-gateway derivation rule, applied against the deployed
/// hostname.
pub fn derive_fallback_gateway(hostname: &str) -> String {
    if hostname == "localhost"
        || hostname == "127.0.0.1"
        || hostname.ends_with(".ar.io")
        || !hostname.contains('.')
    {
        return "https://arweave.net".to_string();
    }
    if let Some(host) = hostname.strip_prefix("roam.") {
        return format!("https://{host}");
    }
    format!("https://{hostname}")
}

fn validate(config: &WayfinderConfig) -> Result<()> {
    if config.fallback.gateways.is_empty() {
        return Err(Error::Configuration(
            "fallback.gateways must not be empty".to_string(),
        ));
    }
    for gateway in &config.fallback.gateways {
        if url::Url::parse(gateway).is_err() {
            return Err(Error::Configuration(format!("invalid fallback gateway: {gateway}")));
        }
    }
    if config.verification.timeout_ms == 0 {
        return Err(Error::Configuration(
            "verification.timeoutMs must be positive".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.telemetry.sample_rate) {
        return Err(Error::Configuration(
            "telemetry.sampleRate must be within [0, 1]".to_string(),
        ));
    }
    Ok(())
}

/// Loads/validates/deep-merges `WayfinderConfig`, persisting under the
/// `wayfinder-config` key named in §6.
pub struct ConfigStore<'a> {
    kv: &'a dyn KvStore,
}

impl<'a> ConfigStore<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self { kv }
    }

    pub async fn load(&self) -> WayfinderConfig {
        get_json(self.kv, CONFIG_KEY).await.unwrap_or_default()
    }

    pub async fn save(&self, config: &WayfinderConfig) -> Result<()> {
        validate(config)?;
        set_json(self.kv, CONFIG_KEY, config).await;
        Ok(())
    }

    /// Apply a partial JSON patch on top of the persisted config (or the
    /// default if none is persisted yet), validate, and save.
    pub async fn update(&self, patch: serde_json::Value) -> Result<WayfinderConfig> {
        let current = self.load().await;
        let mut current_json = serde_json::to_value(&current)?;
        merge(&mut current_json, patch);
        let merged: WayfinderConfig = serde_json::from_value(current_json)?;
        self.save(&merged).await?;
        Ok(merged)
    }
}

fn merge(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                merge(base_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (base, patch) => *base = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::InMemoryKvStore;

    #[test]
    fn fallback_gateway_derivation_rules() {
        assert_eq!(derive_fallback_gateway("localhost"), "https://arweave.net");
        assert_eq!(derive_fallback_gateway("foo.ar.io"), "https://arweave.net");
        assert_eq!(derive_fallback_gateway("nodot"), "https://arweave.net");
        assert_eq!(
            derive_fallback_gateway("roam.example.com"),
            "https://example.com"
        );
        assert_eq!(
            derive_fallback_gateway("other.example.com"),
            "https://other.example.com"
        );
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&WayfinderConfig::default()).is_ok());
    }

    #[test]
    fn empty_fallback_gateways_is_invalid() {
        let mut config = WayfinderConfig::default();
        config.fallback.gateways.clear();
        assert!(validate(&config).is_err());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryKvStore::new();
        let config_store = ConfigStore::new(&store);
        let mut config = WayfinderConfig::default();
        config.telemetry.sample_rate = 0.5;
        config_store.save(&config).await.unwrap();

        let loaded = config_store.load().await;
        assert_eq!(loaded.telemetry.sample_rate, 0.5);
    }

    #[tokio::test]
    async fn update_deep_merges_a_partial_patch() {
        let store = InMemoryKvStore::new();
        let config_store = ConfigStore::new(&store);
        config_store.save(&WayfinderConfig::default()).await.unwrap();

        let patch = serde_json::json!({ "telemetry": { "enabled": true } });
        let merged = config_store.update(patch).await.unwrap();
        assert!(merged.telemetry.enabled);
        assert_eq!(merged.telemetry.sample_rate, 0.0);
    }

    #[test]
    fn routing_mode_presets_apply_expected_strategy() {
        let mut config = WayfinderConfig::default();
        RoutingMode::Fast.apply(&mut config);
        assert_eq!(config.routing.strategy.strategy, RoutingStrategyKind::FastestPing);

        RoutingMode::SelfHosted.apply(&mut config);
        assert_eq!(config.routing.strategy.strategy, RoutingStrategyKind::Static);
    }
}
