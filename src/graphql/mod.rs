//! Paginated transaction search (§4.7): queries multiple GraphQL endpoints
//! for transactions matching a block/media/owner filter, with rate limiting,
//! cursor storage, and gateway failover.

use crate::error::{Error, Result};
use crate::http_client::HttpClient;
use crate::model::{BlockInfo, BundledIn, DataInfo, Media, Owner, Tag, TxMeta};
use crate::rate_limiter::RateLimiter;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const PAGE_SIZE: u32 = 100;
pub const MAX_RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
pub const RETRY_CAP: Duration = Duration::from_millis(3_000);
pub const RETRY_JITTER: f64 = 1.5;
pub const CURSOR_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CursorKey {
    pub media: Media,
    pub min_height: u64,
    pub max_height: u64,
    pub owner: Option<String>,
    pub app_name: Option<String>,
}

struct CursorEntry {
    cursor: String,
    expires_at: Instant,
}

pub struct QueryFilter {
    pub media: Media,
    pub min_height: u64,
    pub max_height: u64,
    pub owner: Option<String>,
    pub app_name: Option<String>,
}

impl QueryFilter {
    fn cursor_key(&self) -> CursorKey {
        CursorKey {
            media: self.media,
            min_height: self.min_height,
            max_height: self.max_height,
            owner: self.owner.clone(),
            app_name: self.app_name.clone(),
        }
    }
}

pub struct QueryPage {
    pub txs: Vec<TxMeta>,
    pub has_more: bool,
    pub cursor: Option<String>,
}

/// Composes and executes the `transactions(...)` search query across a
/// failover list of GraphQL endpoints, per §4.7/§6.
pub struct GraphQLQuery {
    endpoints: Vec<String>,
    client: HttpClient,
    rate_limiter: RateLimiter,
    cursors: Mutex<HashMap<CursorKey, CursorEntry>>,
}

impl GraphQLQuery {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            client: HttpClient::new(),
            rate_limiter: RateLimiter::new(),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch one page, resuming from a stored cursor if a previous
    /// non-exhausting fetch for this exact filter is still within its
    /// 5-minute TTL (§4.7).
    pub async fn fetch_page(&self, filter: &QueryFilter) -> Result<QueryPage> {
        let key = filter.cursor_key();
        let after = self.stored_cursor(&key).await;
        self.fetch_with_cursor(filter, after).await
    }

    async fn stored_cursor(&self, key: &CursorKey) -> Option<String> {
        let mut cursors = self.cursors.lock().await;
        match cursors.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.cursor.clone()),
            Some(_) => {
                cursors.remove(key);
                None
            }
            None => None,
        }
    }

    async fn store_cursor(&self, key: CursorKey, cursor: String) {
        let mut cursors = self.cursors.lock().await;
        cursors.insert(
            key,
            CursorEntry {
                cursor,
                expires_at: Instant::now() + CURSOR_TTL,
            },
        );
    }

    async fn fetch_with_cursor(
        &self,
        filter: &QueryFilter,
        after: Option<String>,
    ) -> Result<QueryPage> {
        let body = build_query(filter, after);

        let mut last_err = None;
        for endpoint in &self.endpoints {
            self.rate_limiter.acquire(endpoint).await;
            match self.fetch_from_endpoint(endpoint, &body).await {
                Ok(page) => {
                    if page.has_more {
                        if let Some(cursor) = &page.cursor {
                            self.store_cursor(filter.cursor_key(), cursor.clone()).await;
                        }
                    }
                    return Ok(page);
                }
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Gateway("no GraphQL endpoints configured".to_string())))
    }

    async fn fetch_from_endpoint(&self, endpoint: &str, body: &Value) -> Result<QueryPage> {
        let mut attempt = 0u32;
        loop {
            match self.client.post_json(endpoint, body, None).await {
                Ok(response) => return parse_response(&response),
                Err(e) if attempt + 1 >= MAX_RETRY_ATTEMPTS || !is_retryable(&e) => return Err(e),
                Err(_) => {
                    let delay = backoff_delay(attempt);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn is_retryable(err: &Error) -> bool {
    matches!(
        err.class(),
        crate::error::ErrorClass::Timeout | crate::error::ErrorClass::Gateway
    )
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = RETRY_BASE_DELAY.as_millis() as f64 * RETRY_JITTER.powi(attempt as i32);
    let jitter = rand::thread_rng().gen_range(0.9..1.1);
    let millis = (base * jitter).min(RETRY_CAP.as_millis() as f64);
    Duration::from_millis(millis as u64)
}

fn build_query(filter: &QueryFilter, after: Option<String>) -> Value {
    let mut tags = vec![json!({
        "name": "Content-Type",
        "values": filter.media.content_types(),
    })];
    if filter.media == Media::Arfs {
        tags.push(json!({ "name": "Entity-Type", "values": ["file"] }));
    }
    if let Some(app_name) = &filter.app_name {
        tags.push(json!({ "name": "App-Name", "values": [app_name] }));
    }

    let query = r#"
        query Transactions($owners: [String!], $min: Int!, $max: Int!, $tags: [TagFilter!], $first: Int!, $after: String) {
          transactions(owners: $owners, block: {min: $min, max: $max}, tags: $tags, sort: HEIGHT_DESC, first: $first, after: $after) {
            edges {
              cursor
              node {
                id
                bundledIn { id }
                owner { address }
                fee { ar }
                quantity { ar }
                tags { name value }
                data { size }
                block { height timestamp }
              }
            }
            pageInfo { hasNextPage }
          }
        }
    "#;

    json!({
        "query": query,
        "variables": {
            "owners": filter.owner.as_ref().map(|o| vec![o.clone()]),
            "min": filter.min_height,
            "max": filter.max_height,
            "tags": tags,
            "first": PAGE_SIZE,
            "after": after,
        }
    })
}

fn parse_response(response: &Value) -> Result<QueryPage> {
    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            return Err(Error::Gateway(format!("GraphQL errors: {errors}")));
        }
    }

    let edges = response
        .pointer("/data/transactions/edges")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let has_more = response
        .pointer("/data/transactions/pageInfo/hasNextPage")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let cursor = edges.last().and_then(|e| e.get("cursor")).and_then(Value::as_str).map(String::from);

    let mut txs = Vec::with_capacity(edges.len());
    for edge in &edges {
        let node = edge
            .get("node")
            .ok_or_else(|| Error::Gateway("GraphQL edge missing node".to_string()))?;
        txs.push(parse_node(node)?);
    }

    Ok(QueryPage { txs, has_more, cursor })
}

fn parse_node(node: &Value) -> Result<TxMeta> {
    let id = node
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Gateway("transaction node missing id".to_string()))?
        .to_string();

    let bundled_in = node
        .get("bundledIn")
        .and_then(|b| b.get("id"))
        .and_then(Value::as_str)
        .map(|id| BundledIn { id: id.to_string() });

    let owner = Owner {
        address: node
            .pointer("/owner/address")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };

    let fee = node.pointer("/fee/ar").and_then(Value::as_str).unwrap_or("0").to_string();
    let quantity = node.pointer("/quantity/ar").and_then(Value::as_str).unwrap_or("0").to_string();

    let tags = node
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|t| {
                    Some(Tag {
                        name: t.get("name")?.as_str()?.to_string(),
                        value: t.get("value")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let data = DataInfo {
        size: node.pointer("/data/size").and_then(Value::as_u64).unwrap_or(0),
    };

    let block = BlockInfo {
        height: node.pointer("/block/height").and_then(Value::as_u64).unwrap_or(0),
        timestamp: node.pointer("/block/timestamp").and_then(Value::as_i64).unwrap_or(0),
    };

    Ok(TxMeta {
        id,
        bundled_in,
        owner,
        fee,
        quantity,
        tags,
        data,
        block,
        arfs_meta: None,
        arns_name: None,
    })
}
