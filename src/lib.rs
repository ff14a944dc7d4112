//! Roam engine
//!
//! A content discovery and verified retrieval engine for a permanent,
//! content-addressed storage network. It finds transactions matching a
//! media filter over a block-height range, feeds them to a consumer one at
//! a time with prefetch and deduplication, and fetches each transaction's
//! payload through a routing/verification pipeline that compares hashes
//! across multiple trusted gateways.
//!
//! # Shape
//!
//! `FetchQueue` discovers transactions via `GraphQLQuery` and hands them to
//! the consumer through `next_tx`. `Wayfinder` resolves and fetches each
//! transaction's payload, routing through a `GatewayProvider` +
//! `RoutingStrategy` pair, optionally verifying the result against
//! independent trusted gateways via `VerificationEngine`, and caching
//! through `ContentCache`. `NavigationController` ties `FetchQueue`,
//! `History`, and `Wayfinder` together for a consumer-facing `next/back/
//! roam` surface.

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod date_block_map;
pub mod deep_link;
pub mod error;
pub mod event_bus;
pub mod fetch_queue;
pub mod gateway;
pub mod graphql;
pub mod history;
pub mod http_client;
pub mod kv_store;
pub mod model;
pub mod navigation;
pub mod preload;
pub mod rate_limiter;
pub mod verification;
pub mod wayfinder;

pub use error::{Error, Result};
