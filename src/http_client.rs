//! Bounded HTTP client (§2's `HttpClient` component).
//!
//! A thin wrapper over `reqwest::Client` adding a per-call timeout and an
//! abort handle, used by every component that talks to a gateway or
//! GraphQL endpoint. The cryptographic hash primitives and the underlying
//! transport are assumed available per §1 — this module only adds the
//! bounded-request discipline the rest of the engine depends on.

use crate::error::{Error, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// A handle that can abort an in-flight request; calling `abort()` causes
/// the awaiting task to surface a `Timeout` error. Used by callers that need
/// to cancel network I/O on consumer-initiated navigation away (§5).
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Paired with an `AbortHandle`; passed into the bounded call that should
/// observe it.
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

pub struct HttpClient {
    client: Client,
    default_timeout: Duration,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            default_timeout: timeout,
        }
    }

    /// Issue a GET, returning the raw bytes. Bounded by `timeout` (or the
    /// client default).
    pub async fn get_bytes(&self, url: &str, timeout: Option<Duration>) -> Result<Vec<u8>> {
        self.get_bytes_abortable(url, timeout, None).await
    }

    /// Issue a GET, additionally observing an `AbortSignal` so a consumer
    /// navigating away can cancel the in-flight fetch (§5).
    pub async fn get_bytes_abortable(
        &self,
        url: &str,
        timeout: Option<Duration>,
        abort: Option<AbortSignal>,
    ) -> Result<Vec<u8>> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let request = self.client.get(url).send();

        let response = match abort {
            Some(mut signal) => {
                tokio::select! {
                    result = tokio::time::timeout(timeout, request) => {
                        result.map_err(|_| Error::Timeout(format!("GET {url} timed out")))??
                    }
                    _ = signal.rx.changed() => {
                        return Err(Error::Timeout(format!("GET {url} aborted")));
                    }
                }
            }
            None => tokio::time::timeout(timeout, request)
                .await
                .map_err(|_| Error::Timeout(format!("GET {url} timed out")))??,
        };

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() || !status.is_success() {
            return Err(Error::Gateway(format!("{url} responded {status}")));
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Issue a HEAD request, returning only success/failure — used by the
    /// `FastestPing` routing strategy's probes.
    pub async fn head(&self, url: &str, timeout: Duration) -> Result<()> {
        let response = tokio::time::timeout(timeout, self.client.head(url).send())
            .await
            .map_err(|_| Error::Timeout(format!("HEAD {url} timed out")))??;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Gateway(format!(
                "{url} responded {}",
                response.status()
            )))
        }
    }

    /// POST a JSON body, returning the parsed JSON response.
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let response = tokio::time::timeout(timeout, self.client.post(url).json(body).send())
            .await
            .map_err(|_| Error::Timeout(format!("POST {url} timed out")))??;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimited(format!("{url} rate limited")));
        }
        if status.is_server_error() {
            return Err(Error::Gateway(format!("{url} responded {status}")));
        }
        if !status.is_success() {
            return Err(Error::Gateway(format!("{url} responded {status}")));
        }
        Ok(response.json().await?)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_positive() {
        let client = HttpClient::new();
        assert!(client.default_timeout > Duration::ZERO);
    }
}
