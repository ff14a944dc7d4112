//! Content verification (§4.3): fetch the same content from K independent
//! trusted gateways and compare content hashes.
//!
//! State machine: `pending -> verifying -> { verified | failed | not-verified }`.
//! `verified` is terminal except for an explicit reset back to `pending`
//! (enforced by `VerificationStatus::apply` in `model.rs`).

use crate::error::Result;
use crate::event_bus::{EventBus, VerificationEvent};
use crate::http_client::HttpClient;
use crate::model::{VerificationProgress, VerificationStage, VerificationState, VerificationStatus};
use std::time::Duration;

pub const TRUSTED_GATEWAY_COUNT: usize = 5;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_VERIFICATION_ATTEMPTS: u32 = 2;

pub struct VerificationEngine {
    client: HttpClient,
    trusted_gateways: Vec<String>,
    timeout: Duration,
    events: EventBus,
}

impl VerificationEngine {
    pub fn new(trusted_gateways: Vec<String>, events: EventBus) -> Self {
        Self {
            client: HttpClient::new(),
            trusted_gateways,
            timeout: DEFAULT_TIMEOUT,
            events,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetches `path` from up to `TRUSTED_GATEWAY_COUNT` independent trusted
    /// gateways (excluding the gateway that served `candidate_hash`) and
    /// compares their content hashes. No reachable witness yields
    /// `NotVerified`; any mismatch is terminal and yields `Failed`; at least
    /// one matching witness yields `Verified`. The whole fan-out is bounded
    /// by `self.timeout`: exceeding it transitions `verifying -> failed`
    /// with `"Verification timeout"`, independent of any per-request timeout
    /// a single witness fetch hits.
    pub async fn verify(
        &self,
        tx_id: &str,
        path: &str,
        candidate_hash: blake3::Hash,
        exclude_gateway: &str,
        timestamp: i64,
    ) -> Result<VerificationStatus> {
        self.events.publish_verification(VerificationEvent::Started {
            tx_id: tx_id.to_string(),
        });

        let witnesses: Vec<&String> = self
            .trusted_gateways
            .iter()
            .filter(|g| g.as_str() != exclude_gateway)
            .take(TRUSTED_GATEWAY_COUNT)
            .collect();

        if witnesses.is_empty() {
            self.events
                .publish_verification(VerificationEvent::NotVerified {
                    tx_id: tx_id.to_string(),
                });
            return Ok(terminal_status(tx_id, VerificationState::NotVerified, None, timestamp));
        }

        match tokio::time::timeout(
            self.timeout,
            self.poll_witnesses(tx_id, path, candidate_hash, &witnesses, timestamp),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let reason = "Verification timeout".to_string();
                self.events.publish_verification(VerificationEvent::Failed {
                    tx_id: tx_id.to_string(),
                    error: reason.clone(),
                });
                Ok(terminal_status(tx_id, VerificationState::Failed, Some(reason), timestamp))
            }
        }
    }

    /// Walks `witnesses` in order, counting unreachable-gateway attempts
    /// against `MAX_VERIFICATION_ATTEMPTS`; exceeding it is terminal
    /// (`Failed`), same as a hash mismatch.
    async fn poll_witnesses(
        &self,
        tx_id: &str,
        path: &str,
        candidate_hash: blake3::Hash,
        witnesses: &[&String],
        timestamp: i64,
    ) -> Result<VerificationStatus> {
        let total = witnesses.len() as u32;
        let mut confirmations = 0usize;
        let mut attempts = 0u32;

        for (i, gateway) in witnesses.iter().enumerate() {
            let url = format!("{}{}", gateway.trim_end_matches('/'), path);
            self.events
                .publish_verification(VerificationEvent::Progress {
                    tx_id: tx_id.to_string(),
                    checked: i + 1,
                    total: witnesses.len(),
                });

            match self.client.get_bytes(&url, Some(self.timeout)).await {
                Ok(bytes) => {
                    let hash = blake3::hash(&bytes);
                    if hash == candidate_hash {
                        confirmations += 1;
                    } else {
                        let reason = format!("hash mismatch from {gateway}");
                        self.events
                            .publish_verification(VerificationEvent::Failed {
                                tx_id: tx_id.to_string(),
                                error: reason.clone(),
                            });
                        return Ok(terminal_status(
                            tx_id,
                            VerificationState::Failed,
                            Some(reason),
                            timestamp,
                        ));
                    }
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(_) => {
                    attempts += 1;
                    if attempts >= MAX_VERIFICATION_ATTEMPTS {
                        let reason = "exceeded maximum verification attempts".to_string();
                        self.events
                            .publish_verification(VerificationEvent::Failed {
                                tx_id: tx_id.to_string(),
                                error: reason.clone(),
                            });
                        return Ok(terminal_status(
                            tx_id,
                            VerificationState::Failed,
                            Some(reason),
                            timestamp,
                        ));
                    }
                    continue;
                }
            }
        }

        if confirmations == 0 {
            self.events
                .publish_verification(VerificationEvent::NotVerified {
                    tx_id: tx_id.to_string(),
                });
            Ok(terminal_status(tx_id, VerificationState::NotVerified, None, timestamp))
        } else {
            self.events
                .publish_verification(VerificationEvent::Verified {
                    tx_id: tx_id.to_string(),
                });
            let mut status = terminal_status(tx_id, VerificationState::Verified, None, timestamp);
            status.progress = Some(VerificationProgress {
                processed: confirmations as u32,
                total,
                percent: 100.0,
                stage: VerificationStage::Verifying,
            });
            Ok(status)
        }
    }
}

fn terminal_status(
    tx_id: &str,
    state: VerificationState,
    error: Option<String>,
    timestamp: i64,
) -> VerificationStatus {
    VerificationStatus {
        tx_id: tx_id.to_string(),
        status: state,
        gateway: None,
        verification_method: Some("blake3-cross-gateway".to_string()),
        error,
        progress: None,
        timestamp,
    }
}
