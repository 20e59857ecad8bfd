use std::sync::Arc;

use crate::gc::ExpiredRx;
use crate::store::Store;

/// Reap tombstones whenever the GC reports an expired index.
///
/// Runs until the expiration channel closes. A failed reap is logged and retried on the
/// next expiration, which always covers the earlier index.
pub async fn run_reaper(store: Arc<Store>, mut expired: ExpiredRx) {
    while let Some(index) = expired.recv().await {
        match store.reap_tombstones(index) {
            Ok(0) => tracing::debug!(index, "no tombstones to reap"),
            Ok(reaped) => tracing::info!(index, reaped, "reaped tombstones"),
            Err(e) => tracing::warn!("Failed to reap tombstones up to {}: {}", index, e),
        }
    }
    tracing::info!("tombstone reaper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::{GcConfig, TombstoneGc};
    use beacon_core::{DirEntry, ReadTxn, Scope};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_reaper_removes_expired_tombstones() {
        let (gc, rx) =
            TombstoneGc::new(GcConfig::new(Duration::from_secs(60), Duration::from_secs(10)))
                .unwrap();
        gc.set_enabled(true);
        let gc = Arc::new(gc);
        let store = Arc::new(Store::with_graveyard_gc(gc.clone()));
        let reaper = tokio::spawn(run_reaper(store.clone(), rx));

        store.kvs_set(&DirEntry::new("foo", "v")).unwrap();
        store.kvs_delete("foo", &Scope::default()).unwrap();
        assert_eq!(store.read_txn().tombstones().unwrap().len(), 1);
        assert!(gc.pending_expiration());

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(store.read_txn().tombstones().unwrap().is_empty());
        assert!(!gc.pending_expiration());
        reaper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_stops_when_channel_closes() {
        let (gc, rx) =
            TombstoneGc::new(GcConfig::new(Duration::from_secs(60), Duration::from_secs(10)))
                .unwrap();
        let reaper = tokio::spawn(run_reaper(Arc::new(Store::new()), rx));
        drop(gc);
        tokio::time::timeout(Duration::from_secs(1), reaper)
            .await
            .unwrap()
            .unwrap();
    }
}
