//! Time-bucketed expiration of tombstones.
//!
//! Every hint lands in the bucket of its expiry time rounded up to the
//! configured granularity, so a burst of deletes arms at most one timer per
//! granularity window. When a bucket fires, the highest index hinted into it
//! is handed to the reaper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcError {
    #[error("Invalid GC configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("Tombstone GC must be created inside a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcConfig {
    /// How long a tombstone is retained after the delete.
    pub ttl: Duration,
    /// Bucket width; expirations are rounded up to a multiple of it.
    pub granularity: Duration,
}

impl GcConfig {
    pub fn new(ttl: Duration, granularity: Duration) -> Self {
        Self { ttl, granularity }
    }
}

struct ExpireInterval {
    max_index: u64,
    generation: u64,
    timer: AbortHandle,
}

struct GcState {
    enabled: bool,
    next_generation: u64,
    /// Bucket slot (multiples of granularity since epoch) to pending reap.
    expires: HashMap<u64, ExpireInterval>,
}

struct Shared {
    state: Mutex<GcState>,
    expired: watch::Sender<u64>,
}

impl Shared {
    fn expire(&self, slot: u64, generation: u64) {
        let index = {
            let mut state = self.state.lock();
            match state.expires.get(&slot) {
                Some(exp) if exp.generation == generation => {}
                _ => return,
            }
            state.expires.remove(&slot).map(|exp| exp.max_index)
        };

        if let Some(index) = index {
            tracing::debug!(index, "tombstone bucket expired");
            self.expired.send_if_modified(|current| {
                if index > *current {
                    *current = index;
                    true
                } else {
                    false
                }
            });
        }
    }
}

/// Receiving end of expired reap indexes.
///
/// Holds one slot: an index not yet received is replaced by a newer one.
pub struct ExpiredRx {
    rx: watch::Receiver<u64>,
}

impl ExpiredRx {
    /// Wait for the next reap index; `None` once the GC is gone.
    pub async fn recv(&mut self) -> Option<u64> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

/// Tombstone expiration timer. Starts disabled.
pub struct TombstoneGc {
    ttl: Duration,
    granularity: Duration,
    epoch: Instant,
    handle: Handle,
    shared: Arc<Shared>,
}

impl TombstoneGc {
    pub fn new(config: GcConfig) -> Result<(Self, ExpiredRx), GcError> {
        if config.ttl.is_zero() {
            return Err(GcError::InvalidConfig("ttl must be positive"));
        }
        if config.granularity.is_zero() {
            return Err(GcError::InvalidConfig("granularity must be positive"));
        }
        let handle = Handle::try_current().map_err(|_| GcError::NoRuntime)?;

        let (tx, rx) = watch::channel(0);
        let gc = Self {
            ttl: config.ttl,
            granularity: config.granularity,
            epoch: Instant::now(),
            handle,
            shared: Arc::new(Shared {
                state: Mutex::new(GcState {
                    enabled: false,
                    next_generation: 0,
                    expires: HashMap::new(),
                }),
                expired: tx,
            }),
        };
        Ok((gc, ExpiredRx { rx }))
    }

    /// Enable or disable the timer. Disabling drops every pending bucket
    /// without firing it.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.shared.state.lock();
        if !enabled {
            for (_, exp) in state.expires.drain() {
                exp.timer.abort();
            }
        }
        if state.enabled != enabled {
            tracing::info!(enabled, "tombstone GC toggled");
        }
        state.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.state.lock().enabled
    }

    /// Schedule reaping of tombstones up to `index` once the TTL passes.
    /// Ignored while disabled.
    pub fn hint(&self, index: u64) {
        let slot = self.next_slot();
        let mut state = self.shared.state.lock();
        if !state.enabled {
            return;
        }

        if let Some(exp) = state.expires.get_mut(&slot) {
            exp.max_index = exp.max_index.max(index);
            return;
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        let deadline = self.slot_deadline(slot);
        let shared = Arc::clone(&self.shared);
        let task = self.handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            shared.expire(slot, generation);
        });
        state.expires.insert(
            slot,
            ExpireInterval {
                max_index: index,
                generation,
                timer: task.abort_handle(),
            },
        );
    }

    /// True while at least one bucket is scheduled.
    pub fn pending_expiration(&self) -> bool {
        !self.shared.state.lock().expires.is_empty()
    }

    /// Number of scheduled buckets.
    pub fn pending_buckets(&self) -> usize {
        self.shared.state.lock().expires.len()
    }

    /// Slot of `now + ttl`, rounded up to the next granularity boundary.
    fn next_slot(&self) -> u64 {
        let expires = self.epoch.elapsed() + self.ttl;
        let slot = expires.as_nanos() / self.granularity.as_nanos() + 1;
        u64::try_from(slot).unwrap_or(u64::MAX)
    }

    fn slot_deadline(&self, slot: u64) -> Instant {
        let nanos = u128::from(slot) * self.granularity.as_nanos();
        self.epoch + Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Drop for TombstoneGc {
    fn drop(&mut self) {
        for (_, exp) in self.shared.state.lock().expires.drain() {
            exp.timer.abort();
        }
    }
}
