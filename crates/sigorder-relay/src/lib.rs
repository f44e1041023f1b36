//! Relay submission and hash-status polling.
//!
//! - Submit signed order envelopes to the relay service
//! - Poll the relay's hash-status endpoint until the order lands
//! - Liveness probe

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sigorder_message::SignedOrderEnvelope;
use sigorder_types::{LandedId, Result, SigOrderError};
use tokio::time::Instant;
use tracing::{debug, warn};

pub mod client;
pub mod memory;

pub use client::RelayClient;
pub use memory::ScriptedRelay;

/// Relay endpoint configuration. Set once, then shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl RelayConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            request_timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(SigOrderError::Config("relay base url is not set".into()));
        }
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SigOrderError::Config(format!("invalid relay url {}: {}", self.base_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SigOrderError::Config(format!(
                "relay url must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(SigOrderError::Config("poll interval must be non-zero".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(SigOrderError::Config("request timeout must be non-zero".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// The relay's synchronous answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub success: bool,
    /// base64(sha256(signature)); valid even when the relay was unreachable.
    pub hash: String,
    pub message: Option<String>,
    /// HTTP status when a response was received.
    pub status: Option<u16>,
}

/// Result of a single hash-status request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Landed(LandedId),
    Pending,
    Unavailable(String),
}

/// Result of the bounded polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Landed(LandedId),
    NotFound,
    RelayUnavailable(String),
}

/// Relay boundary used by the confirmation race.
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Never fails for relay-level rejection; see [`SubmissionResult::success`].
    async fn submit(&self, envelope: &SignedOrderEnvelope) -> SubmissionResult;

    async fn poll_status(&self, hash: &str) -> PollStatus;

    async fn health_check(&self) -> bool;

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(default_poll_interval_ms())
    }
}

/// Poll once per interval until the order lands, the relay becomes
/// unavailable, or `deadline` passes.
pub async fn poll_until_landed(relay: &dyn RelayApi, hash: &str, deadline: Instant) -> PollOutcome {
    let interval = relay.poll_interval();
    let mut attempt = 0u32;

    loop {
        if Instant::now() >= deadline {
            return PollOutcome::NotFound;
        }

        attempt += 1;
        let Ok(status) = tokio::time::timeout_at(deadline, relay.poll_status(hash)).await else {
            debug!(hash, attempt, "deadline reached during hash-status request");
            return PollOutcome::NotFound;
        };
        match status {
            PollStatus::Landed(id) => {
                debug!(hash, attempt, landed_id = %id, "hash-status landed");
                return PollOutcome::Landed(id);
            }
            PollStatus::Unavailable(reason) => {
                warn!(hash, attempt, %reason, "relay unavailable, stopping poll");
                return PollOutcome::RelayUnavailable(reason);
            }
            PollStatus::Pending => {
                debug!(hash, attempt, "hash-status pending");
            }
        }

        let next = Instant::now() + interval;
        if next >= deadline {
            tokio::time::sleep_until(deadline).await;
            return PollOutcome::NotFound;
        }
        tokio::time::sleep_until(next).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(RelayConfig::new("https://relay.example.com").validate().is_ok());
        assert!(matches!(
            RelayConfig::new("").validate(),
            Err(SigOrderError::Config(_))
        ));
        assert!(matches!(
            RelayConfig::new("ftp://relay.example.com").validate(),
            Err(SigOrderError::Config(_))
        ));
        assert!(matches!(
            RelayConfig::new("not a url").validate(),
            Err(SigOrderError::Config(_))
        ));

        let mut no_timeout = RelayConfig::new("https://relay.example.com");
        no_timeout.request_timeout_ms = 0;
        assert!(matches!(no_timeout.validate(), Err(SigOrderError::Config(_))));
    }

    #[test]
    fn test_config_defaults_from_json() {
        let cfg: RelayConfig = serde_json::from_str(r#"{"base_url":"http://localhost:3000"}"#).unwrap();
        assert_eq!(cfg.request_timeout_ms, 30_000);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_lands_on_third_attempt() {
        let relay = ScriptedRelay::accepting().with_polls(vec![
            PollStatus::Pending,
            PollStatus::Pending,
            PollStatus::Landed("42".into()),
        ]);
        let deadline = Instant::now() + Duration::from_secs(10);
        let outcome = poll_until_landed(&relay, "h", deadline).await;
        assert_eq!(outcome, PollOutcome::Landed("42".into()));
        assert_eq!(relay.poll_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_immediately_when_unavailable() {
        let relay = ScriptedRelay::accepting().with_polls(vec![
            PollStatus::Pending,
            PollStatus::Unavailable("status 502".into()),
            PollStatus::Landed("never".into()),
        ]);
        let deadline = Instant::now() + Duration::from_secs(10);
        let outcome = poll_until_landed(&relay, "h", deadline).await;
        assert_eq!(outcome, PollOutcome::RelayUnavailable("status 502".into()));
        assert_eq!(relay.poll_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_gives_up_at_deadline() {
        let relay = ScriptedRelay::accepting();
        let start = Instant::now();
        let deadline = start + Duration::from_millis(3_500);
        let outcome = poll_until_landed(&relay, "h", deadline).await;
        assert_eq!(outcome, PollOutcome::NotFound);
        // polls at 0s, 1s, 2s, 3s
        assert_eq!(relay.poll_calls(), 4);
        assert_eq!(Instant::now(), deadline);
    }

    /// Every hash-status request takes longer than any test deadline.
    struct SlowRelay;

    #[async_trait]
    impl RelayApi for SlowRelay {
        async fn submit(&self, _envelope: &SignedOrderEnvelope) -> SubmissionResult {
            unreachable!("not submitted in poll tests")
        }

        async fn poll_status(&self, _hash: &str) -> PollStatus {
            tokio::time::sleep(Duration::from_secs(30)).await;
            PollStatus::Landed("late".into())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_poll_is_bounded_by_deadline() {
        let start = Instant::now();
        let deadline = start + Duration::from_secs(5);
        let outcome = poll_until_landed(&SlowRelay, "h", deadline).await;
        assert_eq!(outcome, PollOutcome::NotFound);
        assert_eq!(Instant::now(), deadline);
    }
}
