use std::collections::BTreeMap;
use std::sync::Arc;

use beacon_core::{
    DirEntry, HealthCheck, Node, ReadTxn, Scope, Service, StorageError, Table, Tombstone,
    DEFAULT_NAMESPACE, DEFAULT_PARTITION,
};

/// (partition, lowercased node)
pub(crate) type NodeKey = (String, String);
/// (partition, lowercased node, namespace, id)
pub(crate) type InstanceKey = (String, String, String, String);
/// (partition, namespace, key)
pub(crate) type KvKey = (String, String, String);

fn partition(p: &str) -> String {
    if p.is_empty() {
        DEFAULT_PARTITION.to_string()
    } else {
        p.to_string()
    }
}

fn namespace(ns: &str) -> String {
    if ns.is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else {
        ns.to_string()
    }
}

pub(crate) fn node_key(node: &str, part: &str) -> NodeKey {
    (partition(part), node.to_lowercase())
}

pub(crate) fn instance_key(node: &str, id: &str, scope: &Scope) -> InstanceKey {
    (
        partition(&scope.partition),
        node.to_lowercase(),
        namespace(&scope.namespace),
        id.to_string(),
    )
}

pub(crate) fn kv_key(key: &str, scope: &Scope) -> KvKey {
    (
        partition(&scope.partition),
        namespace(&scope.namespace),
        key.to_string(),
    )
}

/// One immutable generation of every table.
///
/// Cloning is cheap; writers copy a table on first mutation.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    nodes: Arc<BTreeMap<NodeKey, Node>>,
    services: Arc<BTreeMap<InstanceKey, Service>>,
    checks: Arc<BTreeMap<InstanceKey, HealthCheck>>,
    kvs: Arc<BTreeMap<KvKey, DirEntry>>,
    tombstones: Arc<BTreeMap<KvKey, Tombstone>>,
    indexes: Arc<BTreeMap<Table, u64>>,
}

fn on_node<'a, V: Clone + 'a>(
    map: &'a BTreeMap<InstanceKey, V>,
    node: &str,
    part: &str,
) -> impl Iterator<Item = V> + 'a {
    let (p, n) = node_key(node, part);
    let start = (p.clone(), n.clone(), String::new(), String::new());
    map.range(start..)
        .take_while(move |(k, _)| k.0 == p && k.1 == n)
        .map(|(_, v)| v.clone())
}

impl Tables {
    pub(crate) fn insert_node(&mut self, key: NodeKey, node: Node) -> Option<Node> {
        Arc::make_mut(&mut self.nodes).insert(key, node)
    }

    pub(crate) fn remove_node(&mut self, key: &NodeKey) -> Option<Node> {
        if !self.nodes.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.nodes).remove(key)
    }

    pub(crate) fn insert_service(&mut self, key: InstanceKey, svc: Service) -> Option<Service> {
        Arc::make_mut(&mut self.services).insert(key, svc)
    }

    pub(crate) fn remove_service(&mut self, key: &InstanceKey) -> Option<Service> {
        if !self.services.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.services).remove(key)
    }

    pub(crate) fn insert_check(&mut self, key: InstanceKey, check: HealthCheck) -> Option<HealthCheck> {
        Arc::make_mut(&mut self.checks).insert(key, check)
    }

    pub(crate) fn remove_check(&mut self, key: &InstanceKey) -> Option<HealthCheck> {
        if !self.checks.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.checks).remove(key)
    }

    pub(crate) fn insert_kv(&mut self, key: KvKey, entry: DirEntry) -> Option<DirEntry> {
        Arc::make_mut(&mut self.kvs).insert(key, entry)
    }

    pub(crate) fn remove_kv(&mut self, key: &KvKey) -> Option<DirEntry> {
        if !self.kvs.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.kvs).remove(key)
    }

    /// Keys of every entry under `prefix` in `scope`.
    pub(crate) fn kv_keys_with_prefix(&self, prefix: &str, scope: &Scope) -> Vec<KvKey> {
        let start = kv_key(prefix, scope);
        let (p, ns) = (start.0.clone(), start.1.clone());
        self.kvs
            .range(start..)
            .take_while(|(k, _)| k.0 == p && k.1 == ns && k.2.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub(crate) fn insert_tombstone(&mut self, key: KvKey, stone: Tombstone) -> Option<Tombstone> {
        Arc::make_mut(&mut self.tombstones).insert(key, stone)
    }

    pub(crate) fn remove_tombstone(&mut self, key: &KvKey) -> Option<Tombstone> {
        if !self.tombstones.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.tombstones).remove(key)
    }

    pub(crate) fn set_index(&mut self, table: Table, index: u64) {
        Arc::make_mut(&mut self.indexes).insert(table, index);
    }
}

impl ReadTxn for Tables {
    fn table_index(&self, table: Table) -> u64 {
        self.indexes.get(&table).copied().unwrap_or(0)
    }

    fn get_node(&self, node: &str, partition: &str) -> Result<Option<Node>, StorageError> {
        Ok(self.nodes.get(&node_key(node, partition)).cloned())
    }

    fn nodes(&self) -> Result<Vec<Node>, StorageError> {
        Ok(self.nodes.values().cloned().collect())
    }

    fn get_service(
        &self,
        node: &str,
        service_id: &str,
        scope: &Scope,
    ) -> Result<Option<Service>, StorageError> {
        Ok(self
            .services
            .get(&instance_key(node, service_id, scope))
            .cloned())
    }

    fn node_services(&self, node: &str, partition: &str) -> Result<Vec<Service>, StorageError> {
        Ok(on_node(&self.services, node, partition).collect())
    }

    fn services(&self) -> Result<Vec<Service>, StorageError> {
        Ok(self.services.values().cloned().collect())
    }

    fn get_check(
        &self,
        node: &str,
        check_id: &str,
        scope: &Scope,
    ) -> Result<Option<HealthCheck>, StorageError> {
        Ok(self
            .checks
            .get(&instance_key(node, check_id, scope))
            .cloned())
    }

    fn node_checks(&self, node: &str, partition: &str) -> Result<Vec<HealthCheck>, StorageError> {
        Ok(on_node(&self.checks, node, partition).collect())
    }

    fn checks(&self) -> Result<Vec<HealthCheck>, StorageError> {
        Ok(self.checks.values().cloned().collect())
    }

    fn get_kv(&self, key: &str, scope: &Scope) -> Result<Option<DirEntry>, StorageError> {
        Ok(self.kvs.get(&kv_key(key, scope)).cloned())
    }

    fn kvs_with_prefix(&self, prefix: &str, scope: &Scope) -> Result<Vec<DirEntry>, StorageError> {
        Ok(self
            .kv_keys_with_prefix(prefix, scope)
            .iter()
            .filter_map(|k| self.kvs.get(k).cloned())
            .collect())
    }

    fn kvs(&self) -> Result<Vec<DirEntry>, StorageError> {
        Ok(self.kvs.values().cloned().collect())
    }

    fn get_tombstone(&self, key: &str, scope: &Scope) -> Result<Option<Tombstone>, StorageError> {
        Ok(self.tombstones.get(&kv_key(key, scope)).cloned())
    }

    fn tombstones(&self) -> Result<Vec<Tombstone>, StorageError> {
        Ok(self.tombstones.values().cloned().collect())
    }

    fn scope_tombstones(&self, scope: &Scope) -> Result<Vec<Tombstone>, StorageError> {
        let (p, ns, _) = kv_key("", scope);
        Ok(self
            .tombstones
            .iter()
            .filter(|(k, _)| k.0 == p && k.1 == ns)
            .map(|(_, v)| v.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_services_stays_on_node() {
        let mut tables = Tables::default();
        for (node, id) in [("node1", "a"), ("node1", "b"), ("node10", "c"), ("node2", "d")] {
            let svc = Service::new(node, id, "web");
            tables.insert_service(instance_key(node, id, &svc.scope), svc);
        }

        let ids: Vec<String> = tables
            .node_services("NODE1", "")
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_kv_prefix_scan_respects_scope() {
        let mut tables = Tables::default();
        let other = Scope::new("default", "team-a");
        for (key, scope) in [
            ("foo/a", Scope::default()),
            ("foo/b", Scope::default()),
            ("fop", Scope::default()),
            ("foo/c", other.clone()),
        ] {
            tables.insert_kv(kv_key(key, &scope), DirEntry::new(key, "v").with_scope(scope));
        }

        let keys: Vec<String> = tables
            .kvs_with_prefix("foo/", &Scope::default())
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["foo/a", "foo/b"]);
        assert_eq!(tables.kvs_with_prefix("", &other).unwrap().len(), 1);
    }

    #[test]
    fn test_clone_is_copy_on_write() {
        let mut a = Tables::default();
        a.insert_node(node_key("n1", ""), Node::new("n1", "10.0.0.1"));
        let snapshot = a.clone();
        a.insert_node(node_key("n2", ""), Node::new("n2", "10.0.0.2"));

        assert_eq!(snapshot.nodes().unwrap().len(), 1);
        assert_eq!(a.nodes().unwrap().len(), 2);
    }
}
