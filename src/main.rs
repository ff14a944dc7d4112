//! Roam engine CLI
//!
//! Command-line interface over the content discovery and verified
//! retrieval engine, for manual exploration and smoke testing.

use clap::{Parser, Subcommand};
use roam_engine::config::{ConfigStore, RoutingMode};
use roam_engine::gateway::{GatewayProvider, StaticProvider};
use roam_engine::gateway::routing::{RandomStrategy, RoutingStrategy};
use roam_engine::kv_store::{InMemoryKvStore, KvStore};
use roam_engine::model::ContentRequest;
use roam_engine::wayfinder::Wayfinder;
use roam_engine::Result;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "roam")]
#[command(about = "Content discovery and verified retrieval engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a single transaction's content through the Wayfinder pipeline
    Fetch {
        /// Transaction id to fetch
        tx_id: String,

        /// Gateways to route through (defaults to arweave.net)
        #[arg(long)]
        gateway: Vec<String>,

        /// Fetch even if a size threshold would otherwise gate it
        #[arg(long)]
        force_load: bool,
    },

    /// Configuration inspection and mutation
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current persisted configuration
    Show,
    /// Apply a named routing-mode preset (balanced, fast, fair-share, self)
    SetRoutingMode { mode: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let kv = InMemoryKvStore::new();

    match cli.command {
        Commands::Fetch { tx_id, gateway, force_load } => {
            run_fetch(&kv, tx_id, gateway, force_load).await?;
        }
        Commands::Config { action } => {
            run_config(&kv, action).await?;
        }
    }

    Ok(())
}

async fn run_fetch(kv: &dyn KvStore, tx_id: String, gateways: Vec<String>, force_load: bool) -> Result<()> {
    let config_store = ConfigStore::new(kv);
    let config = config_store.load().await;

    let gateways = if gateways.is_empty() {
        config.fallback.gateways.clone()
    } else {
        gateways
    };

    let provider: Arc<dyn GatewayProvider> = Arc::new(StaticProvider::new(gateways));
    let strategy: Arc<dyn RoutingStrategy> = Arc::new(RandomStrategy);
    let events = roam_engine::event_bus::EventBus::new();
    let wayfinder = Wayfinder::new(config, provider, strategy, None, events);

    let request = ContentRequest::new(tx_id);
    let now = chrono::Utc::now().timestamp();
    let response = wayfinder.get_content(&request, force_load, false, now).await?;

    print_pretty(&response)?;
    Ok(())
}

async fn run_config(kv: &dyn KvStore, action: ConfigAction) -> Result<()> {
    let config_store = ConfigStore::new(kv);
    match action {
        ConfigAction::Show => {
            let config = config_store.load().await;
            print_pretty(&config)?;
        }
        ConfigAction::SetRoutingMode { mode } => {
            let Some(mode) = RoutingMode::parse(&mode) else {
                return Err(roam_engine::Error::Configuration(format!(
                    "unknown routing mode: {mode}"
                )));
            };
            let mut config = config_store.load().await;
            mode.apply(&mut config);
            config_store.save(&config).await?;
            print_pretty(&config)?;
        }
    }
    Ok(())
}

fn print_pretty<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
