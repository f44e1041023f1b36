//! HTTP client for the signed-order relay.
//!
//! Endpoints:
//! - POST /orders
//! - GET /confirmation/hash-status?hash=<hash>
//! - GET /health

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sigorder_message::SignedOrderEnvelope;
use sigorder_types::{LandedId, Result, SigOrderError};
use tracing::{debug, info, warn};

use crate::{PollOutcome, PollStatus, RelayApi, RelayConfig, SubmissionResult};

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOrderBody {
    pub market_index: u16,
    pub market_type: String,
    /// Hex-encoded canonical message bytes.
    pub message: String,
    /// Base64-encoded signature.
    pub signature: String,
    /// Base58 delegate authority, or "" for a direct signer.
    pub signing_authority: String,
    pub taker_pubkey: String,
}

impl From<&SignedOrderEnvelope> for SubmitOrderBody {
    fn from(env: &SignedOrderEnvelope) -> Self {
        Self {
            market_index: env.market_index,
            market_type: env.market_type.as_str().to_string(),
            message: env.message_hex.clone(),
            signature: env.signature.to_base64(),
            signing_authority: env
                .signing_authority
                .map(|pk| pk.to_base58())
                .unwrap_or_default(),
            taker_pubkey: env.taker.to_base58(),
        }
    }
}

/// Relay reply body; every field is optional because rejections are
/// parsed best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayReply {
    pub error: Option<String>,
    pub message: Option<String>,
}

/// Relay client. Holds only the configured endpoint and a pooled HTTP client.
pub struct RelayClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    poll_interval: Duration,
}

impl RelayClient {
    /// Fails with [`SigOrderError::Config`] if the endpoint is not usable.
    pub fn new(config: &RelayConfig) -> Result<Self> {
        config.validate()?;
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SigOrderError::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
            poll_interval: config.poll_interval(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a signed order.
    ///
    /// POST /orders
    pub async fn submit(&self, envelope: &SignedOrderEnvelope) -> SubmissionResult {
        let hash = envelope.hash();
        let url = format!("{}/orders", self.base_url);
        let body = SubmitOrderBody::from(envelope);

        let resp = match self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(%hash, error = %e, "relay submit failed");
                return SubmissionResult {
                    success: false,
                    hash,
                    message: Some(format!("relay request failed: {}", e)),
                    status: None,
                };
            }
        };

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let reply: RelayReply = serde_json::from_str(&text).unwrap_or_default();

        if status.is_success() {
            info!(%hash, status = status.as_u16(), "relay accepted order");
            return SubmissionResult {
                success: true,
                hash,
                message: reply.message,
                status: Some(status.as_u16()),
            };
        }

        let message = reply
            .message
            .or(reply.error)
            .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
            .unwrap_or_else(|| format!("relay returned status {}", status));
        warn!(%hash, status = status.as_u16(), %message, "relay rejected order");
        SubmissionResult {
            success: false,
            hash,
            message: Some(message),
            status: Some(status.as_u16()),
        }
    }

    /// One hash-status request.
    ///
    /// GET /confirmation/hash-status?hash=<hash>
    pub async fn poll_status(&self, hash: &str) -> PollStatus {
        let url = format!("{}/confirmation/hash-status", self.base_url);

        let resp = match self
            .client
            .get(&url)
            .query(&[("hash", hash)])
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return PollStatus::Unavailable(format!("relay request failed: {}", e)),
        };

        let status = resp.status().as_u16();
        if !(200..500).contains(&status) {
            return PollStatus::Unavailable(format!("relay returned status {}", status));
        }
        if status != 200 {
            debug!(hash, status, "order not yet landed");
            return PollStatus::Pending;
        }

        match resp.text().await {
            Ok(body) => match parse_landed_id(&body) {
                Some(id) => PollStatus::Landed(id),
                None => {
                    warn!(hash, %body, "hash-status 200 without a landed id, polling again");
                    PollStatus::Pending
                }
            },
            Err(e) => PollStatus::Unavailable(format!("failed to read hash-status body: {}", e)),
        }
    }

    /// Poll until landed, unavailable, or `deadline`.
    pub async fn poll_until_landed(&self, hash: &str, deadline: tokio::time::Instant) -> PollOutcome {
        crate::poll_until_landed(self, hash, deadline).await
    }

    /// GET /health
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(resp) => resp.status().as_u16() == 200,
            Err(e) => {
                debug!(error = %e, "relay health probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl RelayApi for RelayClient {
    async fn submit(&self, envelope: &SignedOrderEnvelope) -> SubmissionResult {
        RelayClient::submit(self, envelope).await
    }

    async fn poll_status(&self, hash: &str) -> PollStatus {
        RelayClient::poll_status(self, hash).await
    }

    async fn health_check(&self) -> bool {
        RelayClient::health_check(self).await
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Extract the landed id from a hash-status body.
///
/// Accepts a bare id, a JSON string or number, or an object carrying
/// `order_id`, `landed_id` or `message`.
pub fn parse_landed_id(body: &str) -> Option<LandedId> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Ok(serde_json::Value::Number(n)) => Some(n.to_string()),
        Ok(serde_json::Value::Object(map)) => ["order_id", "landed_id", "message"]
            .iter()
            .find_map(|key| match map.get(*key) {
                Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }),
        Ok(_) => None,
        Err(_) => Some(body.to_string()),
    }
}
