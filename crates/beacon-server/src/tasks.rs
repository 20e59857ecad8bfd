use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;

use beacon_core::CoreError;
use beacon_db::RedbDumpStore;
use beacon_state::Store;
use beacon_stream::EventPublisher;

/// Load the last saved dump into `store`. Returns the restored index, if any.
pub fn restore_latest(store: &Store, dumps: &RedbDumpStore) -> Result<Option<u64>, CoreError> {
    let Some(dump) = dumps.load()? else {
        return Ok(None);
    };
    let index = dump.index;
    store.restore(dump)?;
    Ok(Some(index))
}

/// Save a dump if the store moved past `persisted`. Returns the index now
/// on disk.
pub fn persist_if_changed(
    store: &Store,
    dumps: &RedbDumpStore,
    persisted: u64,
) -> Result<u64, CoreError> {
    if store.latest_index() == persisted {
        return Ok(persisted);
    }
    let dump = store.dump()?;
    dumps.save(&dump)?;
    Ok(dump.index)
}

/// Persist the store every `period` until the task is dropped.
pub async fn run_persistence(store: Arc<Store>, dumps: Arc<RedbDumpStore>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    let mut persisted = store.latest_index();
    loop {
        ticker.tick().await;
        match persist_if_changed(&store, &dumps, persisted) {
            Ok(index) if index != persisted => {
                tracing::info!(index, "persisted state");
                persisted = index;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to persist state"),
        }
    }
}

/// Log every published event at debug level.
pub async fn run_event_logger(publisher: Arc<EventPublisher>) {
    let mut rx = publisher.subscribe();
    loop {
        match rx.recv().await {
            Ok(batch) => {
                for event in batch.iter() {
                    tracing::debug!(
                        topic = %event.topic,
                        index = event.index,
                        op = ?event.op(),
                        key = event.key().unwrap_or_default(),
                        "event"
                    );
                }
            }
            Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "event logger lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
