//! Beacon Core - Catalog records, change sets, events, and storage traits.
//!
//! This crate contains the domain types shared by the Beacon catalog store
//! and its change stream. It has no dependencies on other Beacon crates.

pub mod change;
pub mod check;
pub mod error;
pub mod event;
pub mod kv;
pub mod node;
pub mod scope;
pub mod service;
pub mod txn;

// Re-exports for convenience
pub use change::{Change, ChangeKind, ChangeSet, Delta, Table};
pub use check::{HealthCheck, HealthStatus};
pub use error::{CoreError, EventError, StorageError};
pub use event::{CatalogOp, CheckServiceNode, Event, ServiceHealthPayload, Topic};
pub use kv::{DirEntry, Tombstone};
pub use node::Node;
pub use scope::{Scope, DEFAULT_NAMESPACE, DEFAULT_PARTITION};
pub use service::{ConnectConfig, ProxyConfig, Service, ServiceKind};
pub use txn::{ChangePublisher, DeferredHook, ReadTxn, WriteTxn};
