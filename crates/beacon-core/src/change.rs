use serde::{Deserialize, Serialize};

use crate::check::HealthCheck;
use crate::kv::{DirEntry, Tombstone};
use crate::node::Node;
use crate::service::Service;

/// Store tables that carry their own max index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Nodes,
    Services,
    Checks,
    Kvs,
    Tombstones,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Nodes,
        Table::Services,
        Table::Checks,
        Table::Kvs,
        Table::Tombstones,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Nodes => "nodes",
            Table::Services => "services",
            Table::Checks => "checks",
            Table::Kvs => "kvs",
            Table::Tombstones => "tombstones",
        }
    }
}

/// How an entity was touched by a transaction.
///
/// `Indirect` means the entity itself is unchanged but something it is
/// rendered with (a check) changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Indirect,
    Create,
    Update,
    Delete,
}

/// One raw mutation of a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Delta<T> {
    Created(T),
    Updated { before: T, after: T },
    Deleted(T),
}

impl<T> Delta<T> {
    /// Build a delta from a before/after pair; `None` when both are absent.
    pub fn from_pair(before: Option<T>, after: Option<T>) -> Option<Self> {
        match (before, after) {
            (None, Some(after)) => Some(Delta::Created(after)),
            (Some(before), Some(after)) => Some(Delta::Updated { before, after }),
            (Some(before), None) => Some(Delta::Deleted(before)),
            (None, None) => None,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Delta::Created(_) => ChangeKind::Create,
            Delta::Updated { .. } => ChangeKind::Update,
            Delta::Deleted(_) => ChangeKind::Delete,
        }
    }

    pub fn before(&self) -> Option<&T> {
        match self {
            Delta::Created(_) => None,
            Delta::Updated { before, .. } => Some(before),
            Delta::Deleted(before) => Some(before),
        }
    }

    pub fn after(&self) -> Option<&T> {
        match self {
            Delta::Created(after) => Some(after),
            Delta::Updated { after, .. } => Some(after),
            Delta::Deleted(_) => None,
        }
    }

    /// The after value, or the before value for a delete.
    pub fn object(&self) -> &T {
        match self {
            Delta::Created(obj) | Delta::Deleted(obj) => obj,
            Delta::Updated { after, .. } => after,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    Node(Delta<Node>),
    Service(Delta<Service>),
    Check(Delta<HealthCheck>),
    Kv(Delta<DirEntry>),
    Tombstone(Delta<Tombstone>),
}

impl Change {
    pub fn table(&self) -> Table {
        match self {
            Change::Node(_) => Table::Nodes,
            Change::Service(_) => Table::Services,
            Change::Check(_) => Table::Checks,
            Change::Kv(_) => Table::Kvs,
            Change::Tombstone(_) => Table::Tombstones,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Node(d) => d.kind(),
            Change::Service(d) => d.kind(),
            Change::Check(d) => d.kind(),
            Change::Kv(d) => d.kind(),
            Change::Tombstone(d) => d.kind(),
        }
    }
}

/// The raw mutations of one committed write transaction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub index: u64,
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(index: u64, changes: Vec<Change>) -> Self {
        Self { index, changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}
