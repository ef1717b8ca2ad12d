use std::sync::Arc;
use std::time::Duration;

use blockgate_store::ObjectStore;
use blockgate_types::BlockId;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::records::write_validation;

/// Refresh `validation.json` every `interval` until `token` is cancelled.
///
/// The first write happens one interval after start. A failed write cancels
/// `token`, which aborts the validation sharing it: without a liveness
/// signal the validation could never be told apart from a stuck one.
pub async fn run_heartbeat(
    store: Arc<dyn ObjectStore>,
    block: BlockId,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {
                if let Err(e) = write_validation(store.as_ref(), block, "").await {
                    warn!(block = %block, err = %e, "error during periodic update of validation file");
                    token.cancel();
                    return;
                }
                debug!(block = %block, "validation heartbeat");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use blockgate_store::{FaultInjectingStore, InMemoryObjectStore, StoreOp};
    use blockgate_types::paths::{block_object, VALIDATION_FILENAME};

    use super::*;
    use crate::records::read_validation;

    const INTERVAL: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn failed_write_cancels() {
        let block = BlockId::new();
        let store = Arc::new(
            FaultInjectingStore::new(Arc::new(InMemoryObjectStore::new()))
                .with_fault(StoreOp::Put, block_object(&block, VALIDATION_FILENAME)),
        );
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(store.clone(), block, INTERVAL, token.clone()));

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .expect("heartbeat failure should cancel the token");
        handle.await.unwrap();

        store.clear();
        assert!(read_validation(store.as_ref(), block).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_fresh_record() {
        let block = BlockId::new();
        let store = Arc::new(InMemoryObjectStore::new());
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(store.clone(), block, INTERVAL, token.clone()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while read_validation(store.as_ref(), block).await.unwrap().is_none() {
                tokio::time::sleep(INTERVAL).await;
            }
        })
        .await
        .unwrap();
        token.cancel();
        handle.await.unwrap();

        let record = read_validation(store.as_ref(), block).await.unwrap().unwrap();
        assert_ne!(record.last_update_ms, 0);
        assert!(record.error.is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_first_tick() {
        let block = BlockId::new();
        let store = Arc::new(InMemoryObjectStore::new());
        let token = CancellationToken::new();
        token.cancel();

        run_heartbeat(store.clone(), block, INTERVAL, token).await;
        assert!(store.is_empty());
    }
}
