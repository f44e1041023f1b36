//! Signed-order account codec.
//!
//! Format (little-endian):
//!   discriminator [8]   sha256("sigorder:SignedOrdersAccount")[0..8]
//!   authority     [32]
//!   record_count  u32
//!   records       record_count × { uuid [16], order_id u32, max_slot u64 }
//!
//! Accounts are allocated with headroom, so bytes past the last record are
//! ignored.

use sigorder_message::codec::discriminator;
use sigorder_types::{CorrelationId, Pubkey, Result, SigOrderError, Slot};

const ACCOUNT_KIND: &str = "sigorder:SignedOrdersAccount";
const HEADER_LEN: usize = 8 + 32 + 4;
pub const RECORD_LEN: usize = 16 + 4 + 8;

/// One order the ledger accepted from a signed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedOrderRecord {
    pub uuid: [u8; 16],
    pub order_id: u32,
    pub max_slot: Slot,
}

/// Decoded signed-order account of one taker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOrdersAccount {
    pub authority: Pubkey,
    pub records: Vec<SignedOrderRecord>,
}

impl SignedOrdersAccount {
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(SigOrderError::Decode(format!(
                "signed-order account must be at least {} bytes, got {}",
                HEADER_LEN,
                data.len()
            )));
        }
        if data[0..8] != discriminator(ACCOUNT_KIND) {
            return Err(SigOrderError::Decode("not a signed-order account".into()));
        }

        let mut authority = [0u8; 32];
        authority.copy_from_slice(&data[8..40]);
        let count = u32::from_le_bytes([data[40], data[41], data[42], data[43]]) as usize;

        let body = &data[HEADER_LEN..];
        let needed = count.checked_mul(RECORD_LEN).unwrap_or(usize::MAX);
        if body.len() < needed {
            return Err(SigOrderError::Decode(format!(
                "account declares {} records but holds only {} bytes",
                count,
                body.len()
            )));
        }

        let records = body[..needed]
            .chunks_exact(RECORD_LEN)
            .map(|chunk| {
                let mut uuid = [0u8; 16];
                uuid.copy_from_slice(&chunk[0..16]);
                let mut order_id = [0u8; 4];
                order_id.copy_from_slice(&chunk[16..20]);
                let mut max_slot = [0u8; 8];
                max_slot.copy_from_slice(&chunk[20..28]);
                SignedOrderRecord {
                    uuid,
                    order_id: u32::from_le_bytes(order_id),
                    max_slot: u64::from_le_bytes(max_slot),
                }
            })
            .collect();

        Ok(Self {
            authority: Pubkey::new(authority),
            records,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.records.len() * RECORD_LEN);
        out.extend_from_slice(&discriminator(ACCOUNT_KIND));
        out.extend_from_slice(self.authority.as_bytes());
        out.extend_from_slice(&(self.records.len() as u32).to_le_bytes());
        for r in &self.records {
            out.extend_from_slice(&r.uuid);
            out.extend_from_slice(&r.order_id.to_le_bytes());
            out.extend_from_slice(&r.max_slot.to_le_bytes());
        }
        out
    }

    /// First record whose stored uuid equals `id` byte for byte.
    pub fn find(&self, id: &CorrelationId) -> Option<&SignedOrderRecord> {
        self.records.iter().find(|r| id.matches(&r.uuid))
    }
}
