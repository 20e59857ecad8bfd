//! Beacon State - Versioned in-memory catalog store with tombstone tracking.

pub mod catalog;
pub mod dump;
pub mod gc;
pub mod graveyard;
pub mod kvs;
pub mod reaper;
pub mod store;
mod tables;

pub use catalog::{check_service_node_txn, join_checks, Registration};
pub use dump::StateDump;
pub use gc::{ExpiredRx, GcConfig, GcError, TombstoneGc};
pub use graveyard::Graveyard;
pub use reaper::run_reaper;
pub use store::{MemReadTxn, MemWriteTxn, Store};
