//! Caller-facing client: build, sign, submit and confirm one order.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sigorder_ledger::{LedgerConfig, RpcAccountSource};
use sigorder_message::{
    build_order_message, envelope::sign_order, MessageSigner, SignedOrderEnvelope, SignedOrderParams,
    TakerInfo, DEFAULT_SIGNING_BUFFER,
};
use sigorder_relay::{RelayApi, RelayClient, RelayConfig};
use sigorder_types::{Result, SigOrderError, Slot};
use tracing::info;

use crate::events::{lifecycle_channel, CancelSignal, ConfirmationHandle};
use crate::orchestrator::{ChannelPlan, ConfirmationOrchestrator};
use crate::{ConfirmTiming, ConfirmationOutcome, ConfirmationStrategy};

/// Everything needed to construct a [`SignedOrderClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub relay: RelayConfig,
    /// Without a ledger only relay polling is available.
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,
    #[serde(default)]
    pub timing: ConfirmTiming,
}

impl ClientConfig {
    pub fn new(relay: RelayConfig) -> Self {
        Self {
            relay,
            ledger: None,
            timing: ConfirmTiming::default(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SigOrderError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| SigOrderError::Config(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.relay.validate()?;
        if let Some(ledger) = &self.ledger {
            ledger.validate()?;
        }
        if self.timing.slot_time_ms == 0 {
            return Err(SigOrderError::Config("slot_time_ms must be positive".into()));
        }
        Ok(())
    }
}

/// One order to place.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub params: SignedOrderParams,
    pub taker: TakerInfo,
    pub current_slot: Slot,
    pub signing_buffer: Slot,
    pub strategy: ConfirmationStrategy,
    /// Overrides the window derived from the auction duration.
    pub confirm_duration: Option<Duration>,
}

impl OrderRequest {
    pub fn new(params: SignedOrderParams, taker: TakerInfo, current_slot: Slot) -> Self {
        Self {
            params,
            taker,
            current_slot,
            signing_buffer: DEFAULT_SIGNING_BUFFER,
            strategy: ConfirmationStrategy::Poll,
            confirm_duration: None,
        }
    }

    pub fn with_strategy(mut self, strategy: ConfirmationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_signing_buffer(mut self, signing_buffer: Slot) -> Self {
        self.signing_buffer = signing_buffer;
        self
    }

    pub fn with_confirm_duration(mut self, duration: Duration) -> Self {
        self.confirm_duration = Some(duration);
        self
    }
}

/// Signed-message order client.
pub struct SignedOrderClient {
    orchestrator: Arc<ConfirmationOrchestrator>,
    signer: Arc<dyn MessageSigner>,
    timing: ConfirmTiming,
}

impl SignedOrderClient {
    /// Connects nothing up front; fails only on invalid configuration.
    pub fn new(config: &ClientConfig, signer: Arc<dyn MessageSigner>) -> Result<Self> {
        config.validate()?;
        let relay: Arc<dyn RelayApi> = Arc::new(RelayClient::new(&config.relay)?);
        let mut orchestrator = ConfirmationOrchestrator::new(relay);
        if let Some(ledger) = &config.ledger {
            let source = Arc::new(RpcAccountSource::new(ledger)?);
            orchestrator = orchestrator.with_ledger(source, ledger.max_decode_failures);
        }
        Ok(Self::from_parts(orchestrator, signer, config.timing))
    }

    pub fn from_parts(
        orchestrator: ConfirmationOrchestrator,
        signer: Arc<dyn MessageSigner>,
        timing: ConfirmTiming,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            signer,
            timing,
        }
    }

    pub async fn is_relay_healthy(&self) -> bool {
        self.orchestrator.relay().health_check().await
    }

    /// Build and sign without submitting.
    pub async fn prepare(&self, request: &OrderRequest) -> Result<SignedOrderEnvelope> {
        let built = build_order_message(
            &request.params,
            &request.taker,
            request.current_slot,
            request.signing_buffer,
        );
        sign_order(&built, &request.taker, self.signer.as_ref()).await
    }

    /// Submit and wait for the terminal outcome.
    ///
    /// `Err` means nothing was submitted; once the order reaches the relay
    /// every failure is reported as an outcome.
    pub async fn submit_and_confirm(&self, request: OrderRequest) -> Result<ConfirmationOutcome> {
        let (envelope, plan, duration) = self.stage(&request).await?;
        Ok(self
            .orchestrator
            .run(&envelope, plan, duration, CancelSignal::never(), |_| {})
            .await)
    }

    /// Submit in the background and return a handle on the lifecycle.
    pub async fn submit(&self, request: OrderRequest) -> Result<ConfirmationHandle> {
        let (envelope, plan, duration) = self.stage(&request).await?;
        let (publisher, cancel, handle) = lifecycle_channel(envelope.hash());
        let orchestrator = Arc::clone(&self.orchestrator);

        tokio::spawn(async move {
            let outcome = orchestrator
                .run(&envelope, plan, duration, cancel, |sent| publisher.sent(sent))
                .await;
            publisher.finish(outcome);
        });

        Ok(handle)
    }

    async fn stage(&self, request: &OrderRequest) -> Result<(SignedOrderEnvelope, ChannelPlan, Duration)> {
        let plan = self.orchestrator.plan(request.strategy)?;
        let duration = request.confirm_duration.unwrap_or_else(|| {
            let auction_slots = request
                .params
                .main
                .auction
                .map(|a| u64::from(a.duration_slots))
                .unwrap_or(0);
            self.timing.confirm_duration(auction_slots)
        });
        let envelope = self.prepare(request).await?;
        info!(
            hash = %envelope.hash(),
            slot = request.current_slot,
            expiry_slot = envelope.expiry_slot,
            market_index = envelope.market_index,
            "order signed"
        );
        Ok((envelope, plan, duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sha2::{Digest, Sha256};
    use sigorder_ledger::{MemoryLedger, SignedOrderRecord, SignedOrdersAccount};
    use sigorder_message::{AuctionParams, Direction, OrderParams, OrderType, Signature};
    use sigorder_relay::{PollStatus, ScriptedRelay};
    use sigorder_types::{MarketType, Pubkey};
    use tokio::time::Instant;

    const ACCOUNT: Pubkey = Pubkey::new([4u8; 32]);

    struct HashSigner;

    #[async_trait]
    impl MessageSigner for HashSigner {
        fn authority(&self) -> Pubkey {
            Pubkey::new([8u8; 32])
        }

        async fn sign_message(&self, message: &[u8]) -> Result<Signature> {
            let digest = Sha256::digest(message);
            let mut sig = [0u8; 64];
            sig[..32].copy_from_slice(&digest);
            sig[32..].copy_from_slice(&digest);
            Ok(Signature(sig))
        }
    }

    struct RefusingSigner;

    #[async_trait]
    impl MessageSigner for RefusingSigner {
        fn authority(&self) -> Pubkey {
            Pubkey::new([8u8; 32])
        }

        async fn sign_message(&self, _message: &[u8]) -> Result<Signature> {
            Err(SigOrderError::Signing("user declined".into()))
        }
    }

    fn request(auction_slots: u8) -> OrderRequest {
        let params = SignedOrderParams {
            main: OrderParams {
                order_type: OrderType::Market,
                market_type: MarketType::Perp,
                market_index: 0,
                direction: Direction::Short,
                base_asset_amount: 5_000_000,
                price: 0,
                reduce_only: false,
                post_only: false,
                trigger_price: None,
                auction: Some(AuctionParams {
                    duration_slots: auction_slots,
                    start_price: 100,
                    end_price: 99,
                }),
                max_ts: None,
            },
            take_profit: None,
            stop_loss: None,
        };
        let taker = TakerInfo {
            address: Pubkey::new([2u8; 32]),
            sub_account_id: 0,
            is_delegate: false,
        };
        OrderRequest::new(params, taker, 500)
    }

    fn client(relay: &Arc<ScriptedRelay>, ledger: Option<&Arc<MemoryLedger>>) -> SignedOrderClient {
        let mut orch = ConfirmationOrchestrator::new(relay.clone());
        if let Some(ledger) = ledger {
            orch = orch.with_ledger(ledger.clone(), 5);
        }
        SignedOrderClient::from_parts(orch, Arc::new(HashSigner), ConfirmTiming::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_and_confirm_by_polling() {
        let relay = Arc::new(ScriptedRelay::accepting().with_polls(vec![
            PollStatus::Pending,
            PollStatus::Landed("42".into()),
        ]));
        let client = client(&relay, None);
        let req = request(10);
        let expected_hex = client.prepare(&req).await.unwrap().message_hex;

        let outcome = client.submit_and_confirm(req).await.unwrap();
        assert!(matches!(
            outcome,
            ConfirmationOutcome::Confirmed { ref landed_id, .. } if landed_id == "42"
        ));
        assert_eq!(relay.submit_calls(), 1);
        // Each build draws a fresh correlation id.
        assert_ne!(relay.submitted_messages()[0], expected_hex);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_follows_auction_duration() {
        let relay = Arc::new(ScriptedRelay::accepting());
        let client = client(&relay, None);
        let start = Instant::now();

        let outcome = client.submit_and_confirm(request(20)).await.unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Expired { .. }));
        assert_eq!(Instant::now() - start, Duration::from_millis((20 + 30) * 400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_streams_sent_then_confirmed() {
        let relay = Arc::new(ScriptedRelay::accepting());
        let ledger = Arc::new(MemoryLedger::new());
        let client = client(&relay, Some(&ledger));

        let handle = client
            .submit(request(0).with_strategy(ConfirmationStrategy::Auto { account: ACCOUNT }))
            .await
            .unwrap();
        let mut first = handle.subscribe();
        let mut second = handle.subscribe();

        assert_eq!(
            first.next().await,
            Some(ConfirmationOutcome::Sent { hash: handle.hash().to_string() })
        );

        let uuid = *relay_correlation(&relay).as_bytes();
        ledger.set_account(
            ACCOUNT,
            SignedOrdersAccount {
                authority: Pubkey::new([2u8; 32]),
                records: vec![SignedOrderRecord { uuid, order_id: 31, max_slot: 600 }],
            }
            .encode(),
        );

        let confirmed = ConfirmationOutcome::Confirmed {
            landed_id: "31".into(),
            hash: handle.hash().to_string(),
        };
        assert_eq!(first.next().await, Some(confirmed.clone()));
        assert_eq!(first.next().await, None);
        assert_eq!(second.next().await.map(|e| e.is_terminal()), Some(false));
        assert_eq!(second.next().await, Some(confirmed.clone()));
        assert_eq!(handle.outcome().await, confirmed);
        assert_eq!(ledger.total_listeners(), 0);
    }

    fn relay_correlation(relay: &ScriptedRelay) -> sigorder_types::CorrelationId {
        let hex = relay.submitted_messages().remove(0);
        let bytes = sigorder_types::hex_to_bytes(&hex).unwrap();
        sigorder_message::codec::decode(&bytes).unwrap().correlation_id
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_through_handle() {
        let relay = Arc::new(ScriptedRelay::accepting());
        let client = client(&relay, None);

        let handle = client.submit(request(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        handle.cancel();

        let outcome = handle.outcome().await;
        assert_eq!(
            outcome,
            ConfirmationOutcome::Expired {
                hash: handle.hash().to_string(),
                reason: "cancelled by caller".into()
            }
        );
        let polls = relay.poll_calls();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(relay.poll_calls(), polls);
    }

    #[tokio::test]
    async fn test_watch_without_ledger_fails_before_submission() {
        let relay = Arc::new(ScriptedRelay::accepting());
        let client = client(&relay, None);

        let err = client
            .submit_and_confirm(request(0).with_strategy(ConfirmationStrategy::Watch { account: ACCOUNT }))
            .await
            .unwrap_err();
        assert!(matches!(err, SigOrderError::Config(_)));
        assert_eq!(relay.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_signing_failure_submits_nothing() {
        let relay = Arc::new(ScriptedRelay::accepting());
        let orch = ConfirmationOrchestrator::new(relay.clone());
        let client = SignedOrderClient::from_parts(orch, Arc::new(RefusingSigner), ConfirmTiming::default());

        let err = client.submit(request(0)).await.err().unwrap();
        assert!(matches!(err, SigOrderError::Signing(_)));
        assert_eq!(relay.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejection_surfaces_as_errored_outcome() {
        let relay = Arc::new(ScriptedRelay::rejecting(400, "invalid market"));
        let client = client(&relay, None);
        let handle = client.submit(request(0)).await.unwrap();

        let events: Vec<_> = {
            let mut stream = handle.subscribe();
            let mut seen = Vec::new();
            while let Some(event) = stream.next().await {
                seen.push(event);
            }
            seen
        };
        assert_eq!(
            events,
            vec![ConfirmationOutcome::Errored {
                hash: handle.hash().to_string(),
                reason: "invalid market".into()
            }]
        );
        assert!(client.is_relay_healthy().await);
        assert_eq!(relay.poll_calls(), 0);
    }

    #[test]
    fn test_config_from_json_defaults() {
        let dir = std::env::temp_dir().join(format!("sigorder-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("client.json");
        std::fs::write(&path, r#"{"relay": {"base_url": "https://relay.example"}}"#).unwrap();

        let config = ClientConfig::from_json_file(&path).unwrap();
        assert_eq!(config.relay.poll_interval_ms, 1_000);
        assert!(config.ledger.is_none());
        assert_eq!(config.timing, ConfirmTiming::default());

        std::fs::write(&path, r#"{"relay": {"base_url": "ftp://relay"}}"#).unwrap();
        assert!(matches!(ClientConfig::from_json_file(&path), Err(SigOrderError::Config(_))));
        std::fs::remove_dir_all(&dir).ok();
    }
}
