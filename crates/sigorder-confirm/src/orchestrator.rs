//! The confirmation race.
//!
//! Submit → (poll | watch | both) raced against the deadline. Every channel
//! is a future owned by the race; whichever arm wins, the rest are dropped
//! before the outcome is returned, which releases subscriptions and stops
//! poll loops.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use sigorder_ledger::{AccountSource, LedgerWatcher};
use sigorder_message::SignedOrderEnvelope;
use sigorder_relay::{poll_until_landed, PollOutcome, RelayApi};
use sigorder_types::{CorrelationId, LandedId, Pubkey, Result, SigOrderError};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::events::CancelSignal;
use crate::{ConfirmationOutcome, ConfirmationStrategy};

/// Concrete channels for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPlan {
    pub poll: bool,
    pub watch: Option<Pubkey>,
}

pub struct ConfirmationOrchestrator {
    relay: Arc<dyn RelayApi>,
    watcher: Option<LedgerWatcher>,
}

impl ConfirmationOrchestrator {
    pub fn new(relay: Arc<dyn RelayApi>) -> Self {
        Self { relay, watcher: None }
    }

    pub fn with_ledger(mut self, source: Arc<dyn AccountSource>, max_decode_failures: u32) -> Self {
        self.watcher = Some(LedgerWatcher::new(source, max_decode_failures));
        self
    }

    pub fn relay(&self) -> &Arc<dyn RelayApi> {
        &self.relay
    }

    /// Resolve a strategy against the configured channels.
    pub fn plan(&self, strategy: ConfirmationStrategy) -> Result<ChannelPlan> {
        let has_ledger = self.watcher.is_some();
        match strategy {
            ConfirmationStrategy::Poll => Ok(ChannelPlan { poll: true, watch: None }),
            ConfirmationStrategy::Watch { account } | ConfirmationStrategy::Both { account }
                if !has_ledger =>
            {
                Err(SigOrderError::Config(format!(
                    "cannot watch {}: no ledger source configured",
                    account
                )))
            }
            ConfirmationStrategy::Watch { account } => Ok(ChannelPlan { poll: false, watch: Some(account) }),
            ConfirmationStrategy::Both { account } => Ok(ChannelPlan { poll: true, watch: Some(account) }),
            ConfirmationStrategy::Auto { account } => Ok(ChannelPlan {
                poll: true,
                watch: has_ledger.then_some(account),
            }),
        }
    }

    /// Submit and race the planned channels against `confirm_duration`.
    ///
    /// `on_sent` fires once, after a successful submission and before any
    /// channel starts.
    pub async fn run(
        &self,
        envelope: &SignedOrderEnvelope,
        plan: ChannelPlan,
        confirm_duration: Duration,
        mut cancel: CancelSignal,
        on_sent: impl FnOnce(ConfirmationOutcome),
    ) -> ConfirmationOutcome {
        let submission = self.relay.submit(envelope).await;
        let hash = submission.hash;

        if !submission.success {
            let reason = submission
                .message
                .unwrap_or_else(|| "relay rejected the order".to_string());
            warn!(%hash, status = ?submission.status, %reason, "submission rejected");
            return ConfirmationOutcome::Errored { hash, reason };
        }

        info!(%hash, correlation_id = %envelope.correlation_id, ?plan, ?confirm_duration, "order sent");
        on_sent(ConfirmationOutcome::Sent { hash: hash.clone() });

        let deadline = Instant::now() + confirm_duration;
        let outcome = self
            .race(&hash, envelope.correlation_id, plan, deadline, &mut cancel)
            .await;
        info!(%hash, ?outcome, "confirmation finished");
        outcome
    }

    async fn race(
        &self,
        hash: &str,
        correlation_id: CorrelationId,
        plan: ChannelPlan,
        deadline: Instant,
        cancel: &mut CancelSignal,
    ) -> ConfirmationOutcome {
        let confirmed = |landed_id: LandedId| ConfirmationOutcome::Confirmed {
            landed_id,
            hash: hash.to_string(),
        };

        let mut poll_live = plan.poll;
        let mut poll: BoxFuture<'_, PollOutcome> = if poll_live {
            Box::pin(poll_until_landed(self.relay.as_ref(), hash, deadline))
        } else {
            Box::pin(future::pending())
        };

        let mut watch_live = false;
        let mut watch: BoxFuture<'_, Result<LandedId>> = match (plan.watch, &self.watcher) {
            (Some(account), Some(watcher)) => {
                watch_live = true;
                Box::pin(watcher.watch(account, correlation_id))
            }
            _ => Box::pin(future::pending()),
        };

        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        let mut last_failure: Option<String> = None;

        loop {
            if !poll_live && !watch_live {
                let reason = last_failure.unwrap_or_else(|| "no confirmation channel".to_string());
                return if Instant::now() >= deadline {
                    ConfirmationOutcome::Expired { hash: hash.to_string(), reason }
                } else {
                    ConfirmationOutcome::Errored { hash: hash.to_string(), reason }
                };
            }

            // Channel arms come first so a result in the same tick as the
            // deadline wins.
            tokio::select! {
                biased;

                outcome = &mut poll, if poll_live => match outcome {
                    PollOutcome::Landed(id) => return confirmed(id),
                    PollOutcome::NotFound => {
                        poll_live = false;
                        last_failure = Some("relay did not report the order before the deadline".into());
                    }
                    PollOutcome::RelayUnavailable(reason) => {
                        warn!(hash, %reason, "poll channel stopped");
                        poll_live = false;
                        last_failure = Some(format!("relay unavailable: {}", reason));
                    }
                },

                result = &mut watch, if watch_live => match result {
                    Ok(id) => return confirmed(id),
                    Err(e) => {
                        warn!(hash, error = %e, "watch channel stopped");
                        watch_live = false;
                        last_failure = Some(format!("ledger watch failed: {}", e));
                    }
                },

                _ = cancel.cancelled() => {
                    return ConfirmationOutcome::Expired {
                        hash: hash.to_string(),
                        reason: "cancelled by caller".to_string(),
                    };
                }

                _ = &mut expiry => {
                    return ConfirmationOutcome::Expired {
                        hash: hash.to_string(),
                        reason: "order not confirmed before the deadline".to_string(),
                    };
                }
            }
        }
    }
}
