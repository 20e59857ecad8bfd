use crate::change::{ChangeSet, Table};
use crate::check::HealthCheck;
use crate::error::{EventError, StorageError};
use crate::event::Event;
use crate::kv::{DirEntry, Tombstone};
use crate::node::Node;
use crate::scope::Scope;
use crate::service::Service;

/// Side effect run after a write transaction commits, never on abort.
pub type DeferredHook = Box<dyn FnOnce() + Send + 'static>;

/// Point-in-time read access to the catalog tables.
///
/// Node names are matched case-insensitively. Listing methods return records
/// in key order.
pub trait ReadTxn {
    /// Highest index written to `table`.
    fn table_index(&self, table: Table) -> u64;

    /// Highest index across `tables`.
    fn max_index(&self, tables: &[Table]) -> u64 {
        tables
            .iter()
            .map(|t| self.table_index(*t))
            .max()
            .unwrap_or(0)
    }

    fn get_node(&self, node: &str, partition: &str) -> Result<Option<Node>, StorageError>;

    fn nodes(&self) -> Result<Vec<Node>, StorageError>;

    fn get_service(
        &self,
        node: &str,
        service_id: &str,
        scope: &Scope,
    ) -> Result<Option<Service>, StorageError>;

    /// Every service instance on `node`, across namespaces of the partition.
    fn node_services(&self, node: &str, partition: &str) -> Result<Vec<Service>, StorageError>;

    fn services(&self) -> Result<Vec<Service>, StorageError>;

    /// Instances named `name` in `scope`.
    fn services_by_name(&self, name: &str, scope: &Scope) -> Result<Vec<Service>, StorageError> {
        Ok(self
            .services()?
            .into_iter()
            .filter(|s| s.name == name && &s.scope == scope)
            .collect())
    }

    /// Instances that can serve connect traffic for `name` in `scope`:
    /// connect-native instances of the service, and proxies targeting it.
    fn connect_services(&self, name: &str, scope: &Scope) -> Result<Vec<Service>, StorageError> {
        Ok(self
            .services()?
            .into_iter()
            .filter(|s| &s.scope == scope)
            .filter(|s| {
                (s.connect.native && s.name == name)
                    || (s.is_connect_proxy() && s.proxy.destination_service_name == name)
            })
            .collect())
    }

    fn get_check(
        &self,
        node: &str,
        check_id: &str,
        scope: &Scope,
    ) -> Result<Option<HealthCheck>, StorageError>;

    /// Every check on `node`, across namespaces of the partition.
    fn node_checks(&self, node: &str, partition: &str) -> Result<Vec<HealthCheck>, StorageError>;

    fn checks(&self) -> Result<Vec<HealthCheck>, StorageError>;

    fn get_kv(&self, key: &str, scope: &Scope) -> Result<Option<DirEntry>, StorageError>;

    fn kvs_with_prefix(&self, prefix: &str, scope: &Scope) -> Result<Vec<DirEntry>, StorageError>;

    fn kvs(&self) -> Result<Vec<DirEntry>, StorageError>;

    fn get_tombstone(&self, key: &str, scope: &Scope) -> Result<Option<Tombstone>, StorageError>;

    fn tombstones(&self) -> Result<Vec<Tombstone>, StorageError>;

    /// Tombstones of one scope.
    fn scope_tombstones(&self, scope: &Scope) -> Result<Vec<Tombstone>, StorageError> {
        Ok(self
            .tombstones()?
            .into_iter()
            .filter(|t| &t.scope == scope)
            .collect())
    }
}

/// Mutating access within a single write transaction at a fixed index.
///
/// Every insert and delete is recorded into the transaction's change set.
pub trait WriteTxn: ReadTxn {
    /// Index this transaction commits at.
    fn index(&self) -> u64;

    fn insert_node(&mut self, node: Node) -> Result<(), StorageError>;

    fn delete_node(&mut self, node: &str, partition: &str) -> Result<Option<Node>, StorageError>;

    fn insert_service(&mut self, service: Service) -> Result<(), StorageError>;

    fn delete_service(
        &mut self,
        node: &str,
        service_id: &str,
        scope: &Scope,
    ) -> Result<Option<Service>, StorageError>;

    fn insert_check(&mut self, check: HealthCheck) -> Result<(), StorageError>;

    fn delete_check(
        &mut self,
        node: &str,
        check_id: &str,
        scope: &Scope,
    ) -> Result<Option<HealthCheck>, StorageError>;

    fn insert_kv(&mut self, entry: DirEntry) -> Result<(), StorageError>;

    fn delete_kv(&mut self, key: &str, scope: &Scope) -> Result<Option<DirEntry>, StorageError>;

    /// Delete every entry under `prefix`; returns how many were removed.
    fn delete_kv_prefix(&mut self, prefix: &str, scope: &Scope) -> Result<usize, StorageError>;

    fn insert_tombstone(&mut self, tombstone: Tombstone) -> Result<(), StorageError>;

    fn delete_tombstone(
        &mut self,
        key: &str,
        scope: &Scope,
    ) -> Result<Option<Tombstone>, StorageError>;

    fn set_table_index(&mut self, table: Table, index: u64);

    /// Queue a hook to run once the transaction commits.
    fn defer(&mut self, hook: DeferredHook);
}

/// Turns committed change sets into events for subscribers.
pub trait ChangePublisher: Send + Sync {
    /// Derive events for `changes`, reading post-commit state from `tx`.
    /// An error aborts the commit.
    fn prepare(&self, tx: &dyn ReadTxn, changes: &ChangeSet) -> Result<Vec<Event>, EventError>;

    /// Deliver events derived by `prepare` once the commit is visible.
    fn publish(&self, events: Vec<Event>);
}
