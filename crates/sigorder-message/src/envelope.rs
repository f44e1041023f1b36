//! Signing hand-off and the envelope submitted to the relay.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use sigorder_types::{CorrelationId, MarketType, Pubkey, Result, Slot};

use crate::{BuiltOrderMessage, TakerInfo};

/// A 64-byte signature produced by the external wallet.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Relay-independent correlation key: base64(sha256(signature)).
    pub fn digest(&self) -> String {
        BASE64.encode(Sha256::digest(self.0))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", self.to_base64())
    }
}

/// Wallet boundary. Key management and the signature scheme live behind it.
#[async_trait]
pub trait MessageSigner: Send + Sync {
    /// The authority whose key produces the signature.
    fn authority(&self) -> Pubkey;

    async fn sign_message(&self, message: &[u8]) -> Result<Signature>;
}

/// Canonical message bytes plus the signature over exactly those bytes.
#[derive(Debug, Clone)]
pub struct SignedOrderEnvelope {
    pub message_bytes: Vec<u8>,
    pub message_hex: String,
    pub signature: Signature,
    pub taker: Pubkey,
    /// Set only when a delegate signs on the taker's behalf.
    pub signing_authority: Option<Pubkey>,
    pub market_index: u16,
    pub market_type: MarketType,
    pub correlation_id: CorrelationId,
    pub expiry_slot: Slot,
}

impl SignedOrderEnvelope {
    pub fn from_parts(built: &BuiltOrderMessage, taker: &TakerInfo, signer: Pubkey, signature: Signature) -> Self {
        Self {
            message_bytes: built.bytes.clone(),
            message_hex: built.hex.clone(),
            signature,
            taker: taker.address,
            signing_authority: taker.is_delegate.then_some(signer),
            market_index: built.message.params.market_index,
            market_type: built.message.params.market_type,
            correlation_id: built.message.correlation_id,
            expiry_slot: built.message.expiry_slot,
        }
    }

    /// The hash the relay indexes this submission under.
    pub fn hash(&self) -> String {
        self.signature.digest()
    }
}

/// Hand the canonical bytes to the signer and wrap the result.
pub async fn sign_order(
    built: &BuiltOrderMessage,
    taker: &TakerInfo,
    signer: &dyn MessageSigner,
) -> Result<SignedOrderEnvelope> {
    let signature = signer.sign_message(&built.bytes).await?;
    Ok(SignedOrderEnvelope::from_parts(built, taker, signer.authority(), signature))
}
