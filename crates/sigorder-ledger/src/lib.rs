//! Ledger-side confirmation: read and watch the taker's signed-order account.
//!
//! - `account`: signed-order account layout and decoding
//! - `watcher`: snapshot + live-update search for a correlation id
//! - `rpc`: JSON-RPC / websocket account source
//! - `memory`: in-process account source for tests and simulation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sigorder_types::{Pubkey, Result, SigOrderError};
use tokio::sync::mpsc;

pub mod account;
pub mod memory;
pub mod rpc;
pub mod watcher;

pub use account::{SignedOrderRecord, SignedOrdersAccount};
pub use memory::MemoryLedger;
pub use rpc::RpcAccountSource;
pub use watcher::LedgerWatcher;

/// Ledger connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub ws_url: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_max_decode_failures")]
    pub max_decode_failures: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_max_decode_failures() -> u32 {
    5
}

fn default_request_timeout_ms() -> u64 {
    20_000
}

impl LedgerConfig {
    pub fn new(rpc_url: &str, ws_url: &str) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
            ws_url: ws_url.to_string(),
            commitment: default_commitment(),
            max_decode_failures: default_max_decode_failures(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() || self.ws_url.trim().is_empty() {
            return Err(SigOrderError::Config("ledger rpc and ws urls must be set".into()));
        }
        if !matches!(self.commitment.as_str(), "processed" | "confirmed" | "finalized") {
            return Err(SigOrderError::Config(format!(
                "unknown commitment level {}",
                self.commitment
            )));
        }
        if self.max_decode_failures == 0 {
            return Err(SigOrderError::Config("max_decode_failures must be at least 1".into()));
        }
        Ok(())
    }
}

/// A live account subscription.
///
/// Dropping it deregisters the listener immediately.
pub struct AccountSubscription {
    updates: mpsc::UnboundedReceiver<Vec<u8>>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl AccountSubscription {
    pub fn new(
        updates: mpsc::UnboundedReceiver<Vec<u8>>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            updates,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Next account data update; `None` once the source closed the feed.
    pub async fn next_update(&mut self) -> Option<Vec<u8>> {
        self.updates.recv().await
    }
}

impl Drop for AccountSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

/// Read access to ledger accounts, shared read-only across orders.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// Current account data, `None` if the account does not exist.
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    /// Register a listener for every subsequent change of the account.
    async fn subscribe(&self, address: &Pubkey) -> Result<AccountSubscription>;
}
