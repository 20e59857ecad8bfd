use std::sync::Arc;

use beacon_state::{ExpiredRx, GcError, Store, TombstoneGc};
use beacon_stream::EventPublisher;

use crate::config::Config;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub publisher: Arc<EventPublisher>,
    pub gc: Arc<TombstoneGc>,
}

impl AppState {
    /// Build the store with an enabled tombstone GC and an event publisher.
    /// The returned receiver yields reap indexes for the reaper.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: &Config) -> Result<(Self, ExpiredRx), GcError> {
        let (gc, expired) = TombstoneGc::new(config.gc_config())?;
        gc.set_enabled(true);
        let gc = Arc::new(gc);

        let publisher = Arc::new(EventPublisher::new(config.event_buffer));
        let store = Store::with_graveyard_gc(gc.clone()).with_publisher(publisher.clone());

        Ok((
            Self {
                store: Arc::new(store),
                publisher,
                gc,
            },
            expired,
        ))
    }
}
