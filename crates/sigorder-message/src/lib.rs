//! Signed-message order construction.
//!
//! - Canonical order message model and builder
//! - Fixed-order binary codec shared with the relay and the ledger decoder
//! - Signing hand-off and the envelope submitted to the relay

use serde::{Deserialize, Serialize};
use sigorder_types::{CorrelationId, MarketType, Pubkey, Slot};

pub mod codec;
pub mod envelope;

pub use envelope::{MessageSigner, Signature, SignedOrderEnvelope};

/// Expiry buffer for automated signing (~1s of ledger time).
pub const DEFAULT_SIGNING_BUFFER: Slot = 2;

/// Expiry buffer when a human has to approve the signature in a wallet.
pub const HUMAN_SIGNING_BUFFER: Slot = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    TriggerMarket,
    TriggerLimit,
    Oracle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

/// Dutch-auction parameters of a taker order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionParams {
    pub duration_slots: u8,
    pub start_price: i64,
    pub end_price: i64,
}

/// A fully resolved order as produced by the trade-construction layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderParams {
    pub order_type: OrderType,
    pub market_type: MarketType,
    pub market_index: u16,
    pub direction: Direction,
    pub base_asset_amount: u64,
    pub price: u64,
    pub reduce_only: bool,
    pub post_only: bool,
    pub trigger_price: Option<u64>,
    pub auction: Option<AuctionParams>,
    pub max_ts: Option<i64>,
}

/// Take-profit / stop-loss attached to the main order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketOrder {
    pub base_asset_amount: u64,
    pub trigger_price: u64,
}

/// Everything the caller wants placed with one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOrderParams {
    pub main: OrderParams,
    pub take_profit: Option<BracketOrder>,
    pub stop_loss: Option<BracketOrder>,
}

/// Whose account the order is placed for.
///
/// A direct signer identifies the account by sub-account id; a delegate
/// must name the taker account explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TakerIdentity {
    SubAccount(u16),
    Delegate(Pubkey),
}

/// The taker account an order is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TakerInfo {
    pub address: Pubkey,
    pub sub_account_id: u16,
    pub is_delegate: bool,
}

impl TakerInfo {
    pub fn identity(&self) -> TakerIdentity {
        if self.is_delegate {
            TakerIdentity::Delegate(self.address)
        } else {
            TakerIdentity::SubAccount(self.sub_account_id)
        }
    }
}

/// The canonical order payload. Never mutated after building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderMessage {
    pub params: OrderParams,
    pub taker: TakerIdentity,
    pub expiry_slot: Slot,
    pub correlation_id: CorrelationId,
    pub take_profit: Option<BracketOrder>,
    pub stop_loss: Option<BracketOrder>,
}

/// Output of [`build_order_message`]: the message and its two renderings.
#[derive(Debug, Clone)]
pub struct BuiltOrderMessage {
    pub message: OrderMessage,
    /// Canonical bytes handed to the signer.
    pub bytes: Vec<u8>,
    /// The same bytes as lowercase hex, used on the wire.
    pub hex: String,
}

impl BuiltOrderMessage {
    pub fn correlation_id(&self) -> CorrelationId {
        self.message.correlation_id
    }

    pub fn expiry_slot(&self) -> Slot {
        self.message.expiry_slot
    }
}

/// Build an order message with a fresh random correlation id.
///
/// `expiry_slot = current_slot + signing_buffer`.
pub fn build_order_message(
    params: &SignedOrderParams,
    taker: &TakerInfo,
    current_slot: Slot,
    signing_buffer: Slot,
) -> BuiltOrderMessage {
    build_with_correlation_id(params, taker, current_slot, signing_buffer, CorrelationId::random())
}

/// Same as [`build_order_message`] with a caller-chosen correlation id.
pub fn build_with_correlation_id(
    params: &SignedOrderParams,
    taker: &TakerInfo,
    current_slot: Slot,
    signing_buffer: Slot,
    correlation_id: CorrelationId,
) -> BuiltOrderMessage {
    let message = OrderMessage {
        params: params.main.clone(),
        taker: taker.identity(),
        expiry_slot: current_slot.saturating_add(signing_buffer),
        correlation_id,
        take_profit: params.take_profit,
        stop_loss: params.stop_loss,
    };
    let bytes = codec::encode(&message);
    let hex = hex::encode(&bytes);
    BuiltOrderMessage { message, bytes, hex }
}
