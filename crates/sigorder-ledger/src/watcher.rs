//! Watch a signed-order account for a record carrying a given correlation id.

use std::sync::Arc;

use sigorder_types::{CorrelationId, LandedId, Pubkey, Result, SigOrderError};
use tracing::{debug, info, warn};

use crate::account::SignedOrdersAccount;
use crate::AccountSource;

/// Searches the initial snapshot and every live update with the same matcher.
pub struct LedgerWatcher {
    source: Arc<dyn AccountSource>,
    max_decode_failures: u32,
}

impl LedgerWatcher {
    pub fn new(source: Arc<dyn AccountSource>, max_decode_failures: u32) -> Self {
        Self {
            source,
            max_decode_failures: max_decode_failures.max(1),
        }
    }

    /// Resolve with the landed order id of the first matching record.
    ///
    /// The listener is registered before the snapshot is read so an update
    /// landing in between is not lost. A failed subscription still lets the
    /// snapshot resolve the watch; the subscribe error surfaces only when the
    /// snapshot has no match. Dropping the returned future releases the
    /// listener; returning (with either result) does the same.
    pub async fn watch(&self, address: Pubkey, correlation_id: CorrelationId) -> Result<LandedId> {
        let subscription = self.source.subscribe(&address).await;
        if let Err(e) = &subscription {
            warn!(%address, error = %e, "account subscribe failed, checking snapshot only");
        }
        let mut decode_failures = 0u32;

        match self.source.get_account_data(&address).await {
            Ok(Some(data)) => {
                if let Some(id) = self.search(&data, &correlation_id, &mut decode_failures)? {
                    info!(%address, %correlation_id, landed_id = %id, "order found in account snapshot");
                    return Ok(id);
                }
            }
            Ok(None) => debug!(%address, "signed-order account does not exist yet"),
            Err(e) => warn!(%address, error = %e, "account snapshot read failed, waiting for updates"),
        }

        let mut subscription = subscription?;
        loop {
            let Some(data) = subscription.next_update().await else {
                return Err(SigOrderError::Subscription(format!(
                    "account feed for {} closed",
                    address
                )));
            };
            if let Some(id) = self.search(&data, &correlation_id, &mut decode_failures)? {
                info!(%address, %correlation_id, landed_id = %id, "order found in account update");
                return Ok(id);
            }
        }
    }

    fn search(
        &self,
        data: &[u8],
        correlation_id: &CorrelationId,
        decode_failures: &mut u32,
    ) -> Result<Option<LandedId>> {
        match SignedOrdersAccount::decode(data) {
            Ok(account) => {
                *decode_failures = 0;
                Ok(account
                    .find(correlation_id)
                    .map(|record| record.order_id.to_string()))
            }
            Err(e) => {
                *decode_failures += 1;
                warn!(error = %e, failures = *decode_failures, "skipping undecodable account data");
                if *decode_failures >= self.max_decode_failures {
                    Err(e)
                } else {
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::SignedOrderRecord;
    use crate::MemoryLedger;
    use std::time::Duration;

    const ACCOUNT: Pubkey = Pubkey::new([3u8; 32]);

    fn account_with(records: &[([u8; 16], u32)]) -> Vec<u8> {
        SignedOrdersAccount {
            authority: Pubkey::new([1u8; 32]),
            records: records
                .iter()
                .map(|(uuid, order_id)| SignedOrderRecord {
                    uuid: *uuid,
                    order_id: *order_id,
                    max_slot: 0,
                })
                .collect(),
        }
        .encode()
    }

    fn setup() -> (Arc<MemoryLedger>, LedgerWatcher) {
        let ledger = Arc::new(MemoryLedger::new());
        let watcher = LedgerWatcher::new(ledger.clone(), 3);
        (ledger, watcher)
    }

    #[tokio::test]
    async fn test_snapshot_match_resolves_without_leaving_listener() {
        let (ledger, watcher) = setup();
        ledger.set_account(ACCOUNT, account_with(&[([9; 16], 11)]));

        let id = watcher.watch(ACCOUNT, CorrelationId::from_bytes([9; 16])).await.unwrap();
        assert_eq!(id, "11");
        assert_eq!(ledger.read_calls(), 1);
        assert_eq!(ledger.active_listeners(&ACCOUNT), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_update_resolves() {
        let (ledger, watcher) = setup();
        ledger.set_account(ACCOUNT, account_with(&[([1; 16], 1)]));

        let writer = ledger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            writer.set_account(ACCOUNT, account_with(&[([1; 16], 1), ([8; 16], 7)]));
        });

        let id = watcher.watch(ACCOUNT, CorrelationId::from_bytes([8; 16])).await.unwrap();
        assert_eq!(id, "7");
        assert_eq!(ledger.active_listeners(&ACCOUNT), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_by_drop_releases_listener() {
        let (ledger, watcher) = setup();
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            watcher.watch(ACCOUNT, CorrelationId::from_bytes([8; 16])),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(ledger.subscribe_calls(), 1);
        assert_eq!(ledger.active_listeners(&ACCOUNT), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchers_do_not_cross_match() {
        let (ledger, watcher) = setup();
        let watcher = Arc::new(watcher);

        let w_a = watcher.clone();
        let a = tokio::spawn(async move { w_a.watch(ACCOUNT, CorrelationId::from_bytes([0xa; 16])).await });
        let w_b = watcher.clone();
        let b = tokio::spawn(async move { w_b.watch(ACCOUNT, CorrelationId::from_bytes([0xb; 16])).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        ledger.set_account(ACCOUNT, account_with(&[([0xb; 16], 2)]));
        tokio::time::sleep(Duration::from_millis(10)).await;
        ledger.set_account(ACCOUNT, account_with(&[([0xb; 16], 2), ([0xa; 16], 1)]));

        assert_eq!(a.await.unwrap().unwrap(), "1");
        assert_eq!(b.await.unwrap().unwrap(), "2");
        assert_eq!(ledger.total_listeners(), 0);
    }

    #[tokio::test]
    async fn test_transient_decode_failures_are_skipped() {
        let (ledger, watcher) = setup();
        let writer = ledger.clone();
        let handle = tokio::spawn(async move {
            watcher.watch(ACCOUNT, CorrelationId::from_bytes([4; 16])).await
        });

        while ledger.active_listeners(&ACCOUNT) == 0 {
            tokio::task::yield_now().await;
        }
        writer.set_account(ACCOUNT, vec![0xde, 0xad]);
        writer.set_account(ACCOUNT, vec![0xbe, 0xef]);
        writer.set_account(ACCOUNT, account_with(&[([4; 16], 40)]));

        assert_eq!(handle.await.unwrap().unwrap(), "40");
    }

    #[tokio::test]
    async fn test_persistent_decode_failure_surfaces() {
        let (ledger, watcher) = setup();
        ledger.set_account(ACCOUNT, vec![0u8; 3]);
        let writer = ledger.clone();
        let handle = tokio::spawn(async move {
            watcher.watch(ACCOUNT, CorrelationId::from_bytes([4; 16])).await
        });

        while ledger.active_listeners(&ACCOUNT) == 0 {
            tokio::task::yield_now().await;
        }
        writer.set_account(ACCOUNT, vec![1u8; 3]);
        writer.set_account(ACCOUNT, vec![2u8; 3]);

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SigOrderError::Decode(_)));
        assert_eq!(ledger.active_listeners(&ACCOUNT), 0);
    }

    #[tokio::test]
    async fn test_closed_feed_is_a_channel_failure() {
        let (ledger, watcher) = setup();
        let closer = ledger.clone();
        let handle = tokio::spawn(async move {
            watcher.watch(ACCOUNT, CorrelationId::from_bytes([4; 16])).await
        });

        while closer.active_listeners(&ACCOUNT) == 0 {
            tokio::task::yield_now().await;
        }
        closer.close_subscriptions(&ACCOUNT);

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SigOrderError::Subscription(_)));
    }

    /// Reads go to an in-memory ledger; every subscribe attempt fails.
    struct SnapshotOnly {
        inner: MemoryLedger,
    }

    #[async_trait::async_trait]
    impl AccountSource for SnapshotOnly {
        async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
            self.inner.get_account_data(address).await
        }

        async fn subscribe(&self, _address: &Pubkey) -> Result<crate::AccountSubscription> {
            Err(SigOrderError::Subscription("websocket connect failed".into()))
        }
    }

    #[tokio::test]
    async fn test_snapshot_resolves_when_subscribe_fails() {
        let source = Arc::new(SnapshotOnly { inner: MemoryLedger::new() });
        source.inner.set_account(ACCOUNT, account_with(&[([9; 16], 11)]));
        let watcher = LedgerWatcher::new(source.clone(), 3);

        let id = watcher.watch(ACCOUNT, CorrelationId::from_bytes([9; 16])).await.unwrap();
        assert_eq!(id, "11");
        assert_eq!(source.inner.read_calls(), 1);

        let err = watcher.watch(ACCOUNT, CorrelationId::from_bytes([5; 16])).await.unwrap_err();
        assert!(matches!(err, SigOrderError::Subscription(_)));
        assert_eq!(source.inner.read_calls(), 2);
    }
}
