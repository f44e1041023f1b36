//! Submit-and-confirm orchestration for signed-message orders.
//!
//! Coordinates message building, signing, relay submission and the
//! confirmation race between relay polling, ledger watching and the
//! expiry deadline.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sigorder_types::{LandedId, Pubkey};

pub mod client;
pub mod events;
pub mod orchestrator;

pub use client::{ClientConfig, OrderRequest, SignedOrderClient};
pub use events::{CancelSignal, ConfirmationHandle, EventStream};
pub use orchestrator::{ChannelPlan, ConfirmationOrchestrator};

/// Lifecycle events of one submission.
///
/// `Sent` is informational; exactly one of the other three ends the
/// lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Sent { hash: String },
    Confirmed { landed_id: LandedId, hash: String },
    Expired { hash: String, reason: String },
    Errored { hash: String, reason: String },
}

impl ConfirmationOutcome {
    pub fn hash(&self) -> &str {
        match self {
            ConfirmationOutcome::Sent { hash }
            | ConfirmationOutcome::Confirmed { hash, .. }
            | ConfirmationOutcome::Expired { hash, .. }
            | ConfirmationOutcome::Errored { hash, .. } => hash,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationOutcome::Sent { .. })
    }
}

/// Which confirmation channel(s) to race against the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConfirmationStrategy {
    /// Relay hash-status polling only.
    Poll,
    /// Watch the taker's signed-order account only.
    Watch { account: Pubkey },
    /// Race both channels.
    Both { account: Pubkey },
    /// Both when a ledger source is configured, otherwise polling.
    Auto { account: Pubkey },
}

/// Converts slot counts into the confirmation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmTiming {
    #[serde(default = "default_confirmation_slot_buffer")]
    pub confirmation_slot_buffer: u64,
    #[serde(default = "default_slot_time_ms")]
    pub slot_time_ms: u64,
}

fn default_confirmation_slot_buffer() -> u64 {
    30
}

fn default_slot_time_ms() -> u64 {
    400
}

impl Default for ConfirmTiming {
    fn default() -> Self {
        Self {
            confirmation_slot_buffer: default_confirmation_slot_buffer(),
            slot_time_ms: default_slot_time_ms(),
        }
    }
}

impl ConfirmTiming {
    /// `(auction_duration_slots + confirmation_slot_buffer) * slot_time_ms`
    pub fn confirm_duration(&self, auction_duration_slots: u64) -> Duration {
        let slots = auction_duration_slots.saturating_add(self.confirmation_slot_buffer);
        Duration::from_millis(slots.saturating_mul(self.slot_time_ms))
    }
}
