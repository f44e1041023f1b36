//! In-process account source (for testing and simulation).
//!
//! Tracks reads, subscriptions and live listeners so callers can assert
//! that nothing is left registered after a watch resolves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sigorder_types::{Pubkey, Result};
use tokio::sync::mpsc;

use crate::{AccountSource, AccountSubscription};

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Pubkey, Vec<u8>>,
    listeners: HashMap<u64, (Pubkey, mpsc::UnboundedSender<Vec<u8>>)>,
    next_listener: u64,
}

fn lock(state: &Mutex<LedgerState>) -> MutexGuard<'_, LedgerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory ledger.
#[derive(Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    reads: AtomicUsize,
    subscribes: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the account data and notify every listener on the address.
    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        let mut state = lock(&self.state);
        for (listener_address, tx) in state.listeners.values() {
            if *listener_address == address {
                let _ = tx.send(data.clone());
            }
        }
        state.accounts.insert(address, data);
    }

    /// Drop the sending side of every listener on the address.
    pub fn close_subscriptions(&self, address: &Pubkey) {
        lock(&self.state)
            .listeners
            .retain(|_, (listener_address, _)| listener_address != address);
    }

    pub fn active_listeners(&self, address: &Pubkey) -> usize {
        lock(&self.state)
            .listeners
            .values()
            .filter(|(listener_address, _)| listener_address == address)
            .count()
    }

    pub fn total_listeners(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountSource for MemoryLedger {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.state).accounts.get(address).cloned())
    }

    async fn subscribe(&self, address: &Pubkey) -> Result<AccountSubscription> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = lock(&self.state);
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.insert(id, (*address, tx));
            id
        };

        let registry = Arc::clone(&self.state);
        Ok(AccountSubscription::new(rx, move || {
            lock(&registry).listeners.remove(&id);
        }))
    }
}
