use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use beacon_core::{
    Change, ChangePublisher, ChangeSet, CoreError, DeferredHook, Delta, DirEntry, HealthCheck,
    Node, ReadTxn, Scope, Service, StorageError, Table, Tombstone, WriteTxn,
};

use crate::gc::TombstoneGc;
use crate::graveyard::Graveyard;
use crate::tables::{instance_key, kv_key, node_key, InstanceKey, KvKey, NodeKey, Tables};

/// Implements `ReadTxn` by forwarding to a `Tables` field.
macro_rules! delegate_read_txn {
    ($ty:ty, $field:ident) => {
        impl ReadTxn for $ty {
            fn table_index(&self, table: Table) -> u64 {
                self.$field.table_index(table)
            }
            fn get_node(&self, node: &str, partition: &str) -> Result<Option<Node>, StorageError> {
                self.$field.get_node(node, partition)
            }
            fn nodes(&self) -> Result<Vec<Node>, StorageError> {
                self.$field.nodes()
            }
            fn get_service(
                &self,
                node: &str,
                service_id: &str,
                scope: &Scope,
            ) -> Result<Option<Service>, StorageError> {
                self.$field.get_service(node, service_id, scope)
            }
            fn node_services(&self, node: &str, partition: &str) -> Result<Vec<Service>, StorageError> {
                self.$field.node_services(node, partition)
            }
            fn services(&self) -> Result<Vec<Service>, StorageError> {
                self.$field.services()
            }
            fn get_check(
                &self,
                node: &str,
                check_id: &str,
                scope: &Scope,
            ) -> Result<Option<HealthCheck>, StorageError> {
                self.$field.get_check(node, check_id, scope)
            }
            fn node_checks(&self, node: &str, partition: &str) -> Result<Vec<HealthCheck>, StorageError> {
                self.$field.node_checks(node, partition)
            }
            fn checks(&self) -> Result<Vec<HealthCheck>, StorageError> {
                self.$field.checks()
            }
            fn get_kv(&self, key: &str, scope: &Scope) -> Result<Option<DirEntry>, StorageError> {
                self.$field.get_kv(key, scope)
            }
            fn kvs_with_prefix(&self, prefix: &str, scope: &Scope) -> Result<Vec<DirEntry>, StorageError> {
                self.$field.kvs_with_prefix(prefix, scope)
            }
            fn kvs(&self) -> Result<Vec<DirEntry>, StorageError> {
                self.$field.kvs()
            }
            fn get_tombstone(&self, key: &str, scope: &Scope) -> Result<Option<Tombstone>, StorageError> {
                self.$field.get_tombstone(key, scope)
            }
            fn tombstones(&self) -> Result<Vec<Tombstone>, StorageError> {
                self.$field.tombstones()
            }
            fn scope_tombstones(&self, scope: &Scope) -> Result<Vec<Tombstone>, StorageError> {
                self.$field.scope_tombstones(scope)
            }
        }
    };
}

/// Versioned in-memory catalog store.
///
/// Writers are serialized; readers see the last committed generation and
/// never block writers.
pub struct Store {
    current: RwLock<Tables>,
    writer: Mutex<()>,
    latest_index: AtomicU64,
    publisher: Option<Arc<dyn ChangePublisher>>,
    graveyard: Graveyard,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Tables::default()),
            writer: Mutex::new(()),
            latest_index: AtomicU64::new(0),
            publisher: None,
            graveyard: Graveyard::new(None),
        }
    }

    /// Store whose graveyard hints `gc` for every tombstone it creates.
    pub fn with_graveyard_gc(gc: Arc<TombstoneGc>) -> Self {
        Self {
            graveyard: Graveyard::new(Some(gc)),
            ..Self::new()
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ChangePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn graveyard(&self) -> &Graveyard {
        &self.graveyard
    }

    /// Index of the last committed write.
    pub fn latest_index(&self) -> u64 {
        self.latest_index.load(Ordering::SeqCst)
    }

    pub fn read_txn(&self) -> MemReadTxn {
        MemReadTxn {
            tables: self.current.read().clone(),
        }
    }

    /// Open a write transaction committing at `index`.
    pub fn write_txn(&self, index: u64) -> MemWriteTxn<'_> {
        let guard = self.writer.lock();
        self.open_write(guard, index)
    }

    /// Open a write transaction at the next free index.
    pub fn begin_write(&self) -> MemWriteTxn<'_> {
        let guard = self.writer.lock();
        let index = self.latest_index() + 1;
        self.open_write(guard, index)
    }

    fn open_write<'a>(&'a self, guard: MutexGuard<'a, ()>, index: u64) -> MemWriteTxn<'a> {
        MemWriteTxn {
            store: self,
            _writer: guard,
            index,
            tables: self.current.read().clone(),
            tracker: ChangeTracker::default(),
            hooks: Vec::new(),
        }
    }

    pub(crate) fn raise_latest_index(&self, index: u64) {
        self.latest_index.fetch_max(index, Ordering::SeqCst);
    }
}

/// Read-only view of one committed generation.
pub struct MemReadTxn {
    tables: Tables,
}

delegate_read_txn!(MemReadTxn, tables);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RecordKey {
    Node(NodeKey),
    Service(InstanceKey),
    Check(InstanceKey),
    Kv(KvKey),
    Tombstone(KvKey),
}

#[derive(Debug, Clone)]
enum Record {
    Node(Node),
    Service(Service),
    Check(HealthCheck),
    Kv(DirEntry),
    Tombstone(Tombstone),
}

impl Record {
    fn node(self) -> Option<Node> {
        match self {
            Record::Node(v) => Some(v),
            _ => None,
        }
    }

    fn service(self) -> Option<Service> {
        match self {
            Record::Service(v) => Some(v),
            _ => None,
        }
    }

    fn check(self) -> Option<HealthCheck> {
        match self {
            Record::Check(v) => Some(v),
            _ => None,
        }
    }

    fn kv(self) -> Option<DirEntry> {
        match self {
            Record::Kv(v) => Some(v),
            _ => None,
        }
    }

    fn tombstone(self) -> Option<Tombstone> {
        match self {
            Record::Tombstone(v) => Some(v),
            _ => None,
        }
    }
}

struct Slot {
    before: Option<Record>,
    after: Option<Record>,
}

/// Records raw mutations, one slot per primary key in first-touch order.
/// A slot keeps the first before value and the last after value.
#[derive(Default)]
struct ChangeTracker {
    order: Vec<RecordKey>,
    slots: HashMap<RecordKey, Slot>,
}

impl ChangeTracker {
    fn record(&mut self, key: RecordKey, before: Option<Record>, after: Option<Record>) {
        match self.slots.entry(key) {
            Entry::Occupied(mut slot) => slot.get_mut().after = after,
            Entry::Vacant(slot) => {
                self.order.push(slot.key().clone());
                slot.insert(Slot { before, after });
            }
        }
    }

    fn changes(&self) -> Vec<Change> {
        self.order
            .iter()
            .filter_map(|key| {
                let slot = self.slots.get(key)?;
                let (before, after) = (slot.before.clone(), slot.after.clone());
                match key {
                    RecordKey::Node(_) => {
                        Delta::from_pair(before.and_then(Record::node), after.and_then(Record::node))
                            .map(Change::Node)
                    }
                    RecordKey::Service(_) => Delta::from_pair(
                        before.and_then(Record::service),
                        after.and_then(Record::service),
                    )
                    .map(Change::Service),
                    RecordKey::Check(_) => Delta::from_pair(
                        before.and_then(Record::check),
                        after.and_then(Record::check),
                    )
                    .map(Change::Check),
                    RecordKey::Kv(_) => {
                        Delta::from_pair(before.and_then(Record::kv), after.and_then(Record::kv))
                            .map(Change::Kv)
                    }
                    RecordKey::Tombstone(_) => Delta::from_pair(
                        before.and_then(Record::tombstone),
                        after.and_then(Record::tombstone),
                    )
                    .map(Change::Tombstone),
                }
            })
            .collect()
    }
}

/// A write transaction. Dropping it without `commit` discards every change
/// and every deferred hook.
pub struct MemWriteTxn<'a> {
    store: &'a Store,
    _writer: MutexGuard<'a, ()>,
    index: u64,
    tables: Tables,
    tracker: ChangeTracker,
    hooks: Vec<DeferredHook>,
}

delegate_read_txn!(MemWriteTxn<'_>, tables);

impl MemWriteTxn<'_> {
    /// Raw mutations recorded so far.
    pub fn changes(&self) -> ChangeSet {
        ChangeSet::new(self.index, self.tracker.changes())
    }

    /// Make the changes visible, publish events, then run deferred hooks.
    ///
    /// Event derivation runs first against the uncommitted view; if it
    /// fails nothing is committed.
    pub fn commit(self) -> Result<ChangeSet, CoreError> {
        self.commit_inner(true)
    }

    /// Commit without deriving or publishing events.
    pub(crate) fn commit_silent(self) -> Result<ChangeSet, CoreError> {
        self.commit_inner(false)
    }

    fn commit_inner(self, publish: bool) -> Result<ChangeSet, CoreError> {
        let store = self.store;
        let changes = self.changes();
        let publisher = if publish {
            store.publisher.as_ref()
        } else {
            None
        };

        let events = match publisher {
            Some(p) if !changes.is_empty() => p.prepare(&self, &changes)?,
            _ => Vec::new(),
        };

        let MemWriteTxn {
            _writer,
            index,
            tables,
            hooks,
            ..
        } = self;

        *store.current.write() = tables;
        store.raise_latest_index(index);

        // Publish under the writer lock so batches leave in index order.
        if let Some(p) = publisher {
            if !events.is_empty() {
                tracing::debug!(index, events = events.len(), "publishing change events");
                p.publish(events);
            }
        }
        drop(_writer);

        for hook in hooks {
            hook();
        }

        Ok(changes)
    }
}

impl WriteTxn for MemWriteTxn<'_> {
    fn index(&self) -> u64 {
        self.index
    }

    fn insert_node(&mut self, node: Node) -> Result<(), StorageError> {
        let key = node_key(&node.node, &node.partition);
        let before = self.tables.insert_node(key.clone(), node.clone());
        self.tracker.record(
            RecordKey::Node(key),
            before.map(Record::Node),
            Some(Record::Node(node)),
        );
        Ok(())
    }

    fn delete_node(&mut self, node: &str, partition: &str) -> Result<Option<Node>, StorageError> {
        let key = node_key(node, partition);
        let before = self.tables.remove_node(&key);
        if let Some(prev) = &before {
            self.tracker
                .record(RecordKey::Node(key), Some(Record::Node(prev.clone())), None);
        }
        Ok(before)
    }

    fn insert_service(&mut self, service: Service) -> Result<(), StorageError> {
        let key = instance_key(&service.node, &service.id, &service.scope);
        let before = self.tables.insert_service(key.clone(), service.clone());
        self.tracker.record(
            RecordKey::Service(key),
            before.map(Record::Service),
            Some(Record::Service(service)),
        );
        Ok(())
    }

    fn delete_service(
        &mut self,
        node: &str,
        service_id: &str,
        scope: &Scope,
    ) -> Result<Option<Service>, StorageError> {
        let key = instance_key(node, service_id, scope);
        let before = self.tables.remove_service(&key);
        if let Some(prev) = &before {
            self.tracker.record(
                RecordKey::Service(key),
                Some(Record::Service(prev.clone())),
                None,
            );
        }
        Ok(before)
    }

    fn insert_check(&mut self, check: HealthCheck) -> Result<(), StorageError> {
        let key = instance_key(&check.node, &check.check_id, &check.scope);
        let before = self.tables.insert_check(key.clone(), check.clone());
        self.tracker.record(
            RecordKey::Check(key),
            before.map(Record::Check),
            Some(Record::Check(check)),
        );
        Ok(())
    }

    fn delete_check(
        &mut self,
        node: &str,
        check_id: &str,
        scope: &Scope,
    ) -> Result<Option<HealthCheck>, StorageError> {
        let key = instance_key(node, check_id, scope);
        let before = self.tables.remove_check(&key);
        if let Some(prev) = &before {
            self.tracker
                .record(RecordKey::Check(key), Some(Record::Check(prev.clone())), None);
        }
        Ok(before)
    }

    fn insert_kv(&mut self, entry: DirEntry) -> Result<(), StorageError> {
        let key = kv_key(&entry.key, &entry.scope);
        let before = self.tables.insert_kv(key.clone(), entry.clone());
        self.tracker
            .record(RecordKey::Kv(key), before.map(Record::Kv), Some(Record::Kv(entry)));
        Ok(())
    }

    fn delete_kv(&mut self, key: &str, scope: &Scope) -> Result<Option<DirEntry>, StorageError> {
        let key = kv_key(key, scope);
        let before = self.tables.remove_kv(&key);
        if let Some(prev) = &before {
            self.tracker
                .record(RecordKey::Kv(key), Some(Record::Kv(prev.clone())), None);
        }
        Ok(before)
    }

    fn delete_kv_prefix(&mut self, prefix: &str, scope: &Scope) -> Result<usize, StorageError> {
        let keys = self.tables.kv_keys_with_prefix(prefix, scope);
        let mut deleted = 0;
        for key in keys {
            if let Some(prev) = self.tables.remove_kv(&key) {
                self.tracker
                    .record(RecordKey::Kv(key), Some(Record::Kv(prev)), None);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn insert_tombstone(&mut self, tombstone: Tombstone) -> Result<(), StorageError> {
        let key = kv_key(&tombstone.key, &tombstone.scope);
        let before = self.tables.insert_tombstone(key.clone(), tombstone.clone());
        self.tracker.record(
            RecordKey::Tombstone(key),
            before.map(Record::Tombstone),
            Some(Record::Tombstone(tombstone)),
        );
        Ok(())
    }

    fn delete_tombstone(
        &mut self,
        key: &str,
        scope: &Scope,
    ) -> Result<Option<Tombstone>, StorageError> {
        let key = kv_key(key, scope);
        let before = self.tables.remove_tombstone(&key);
        if let Some(prev) = &before {
            self.tracker.record(
                RecordKey::Tombstone(key),
                Some(Record::Tombstone(prev.clone())),
                None,
            );
        }
        Ok(before)
    }

    fn set_table_index(&mut self, table: Table, index: u64) {
        self.tables.set_index(table, index);
    }

    fn defer(&mut self, hook: DeferredHook) {
        self.hooks.push(hook);
    }
}
