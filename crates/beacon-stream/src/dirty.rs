//! Per-entity dirty marking over one change set.

use std::collections::BTreeMap;

use beacon_core::{
    Change, ChangeKind, ChangeSet, Delta, HealthCheck, Node, Scope, Service, DEFAULT_PARTITION,
};

/// Combine a new mark with the one already recorded for an entity.
///
/// A real mutation replaces an absent or indirect mark; an indirect mark
/// never replaces anything.
pub fn merge(existing: Option<ChangeKind>, incoming: ChangeKind) -> ChangeKind {
    match existing {
        None | Some(ChangeKind::Indirect) => incoming,
        Some(real) => real,
    }
}

fn partition_or_default(partition: &str) -> String {
    if partition.is_empty() {
        DEFAULT_PARTITION.to_string()
    } else {
        partition.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeTuple {
    /// Lowercased node name.
    pub node: String,
    pub partition: String,
}

impl NodeTuple {
    pub fn new(node: &str, partition: &str) -> Self {
        Self {
            node: node.to_lowercase(),
            partition: partition_or_default(partition),
        }
    }

    pub fn from_node(node: &Node) -> Self {
        Self::new(&node.node, &node.partition)
    }

    pub fn from_check(check: &HealthCheck) -> Self {
        Self::new(&check.node, &check.scope.partition)
    }
}

/// Identity of one service instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceTuple {
    pub node: String,
    pub service_id: String,
    pub scope: Scope,
}

impl ServiceTuple {
    pub fn new(node: &str, service_id: &str, scope: &Scope) -> Self {
        let mut scope = scope.clone();
        scope.normalize();
        Self {
            node: node.to_lowercase(),
            service_id: service_id.to_string(),
            scope,
        }
    }

    pub fn from_service(svc: &Service) -> Self {
        Self::new(&svc.node, &svc.id, &svc.scope)
    }

    pub fn from_check(check: &HealthCheck) -> Self {
        Self::new(&check.node, &check.service_id, &check.scope)
    }

    pub fn node_tuple(&self) -> NodeTuple {
        NodeTuple::new(&self.node, &self.scope.partition)
    }
}

/// Dirty mark of a service instance. `delta` is set when the service record
/// itself changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMark {
    pub kind: ChangeKind,
    pub delta: Option<Delta<Service>>,
}

impl ServiceMark {
    pub fn indirect() -> Self {
        Self {
            kind: ChangeKind::Indirect,
            delta: None,
        }
    }

    pub fn direct(delta: Delta<Service>) -> Self {
        Self {
            kind: delta.kind(),
            delta: Some(delta),
        }
    }
}

/// Nodes and service instances touched by one change set.
#[derive(Debug, Default)]
pub struct DirtySet {
    pub nodes: BTreeMap<NodeTuple, ChangeKind>,
    pub services: BTreeMap<ServiceTuple, ServiceMark>,
}

impl DirtySet {
    pub fn mark_node(&mut self, tuple: NodeTuple, kind: ChangeKind) {
        let merged = merge(self.nodes.get(&tuple).copied(), kind);
        self.nodes.insert(tuple, merged);
    }

    pub fn mark_service(&mut self, tuple: ServiceTuple, mark: ServiceMark) {
        match self.services.get(&tuple) {
            Some(existing) if existing.kind != ChangeKind::Indirect => {}
            _ => {
                self.services.insert(tuple, mark);
            }
        }
    }

    /// Classify every raw change of `changes` once.
    pub fn from_changes(changes: &ChangeSet) -> Self {
        let mut dirty = DirtySet::default();
        for change in &changes.changes {
            match change {
                Change::Node(delta) => {
                    dirty.mark_node(NodeTuple::from_node(delta.object()), delta.kind());
                }
                Change::Service(delta) => {
                    dirty.mark_service(
                        ServiceTuple::from_service(delta.object()),
                        ServiceMark::direct(delta.clone()),
                    );
                }
                Change::Check(delta) => dirty.mark_check(delta),
                Change::Kv(_) | Change::Tombstone(_) => {}
            }
        }
        dirty
    }

    fn mark_check(&mut self, delta: &Delta<HealthCheck>) {
        match delta {
            Delta::Updated { before, after } => {
                // a check moving between node and service scope touches
                // every instance on the node
                if before.is_node_scoped() || after.is_node_scoped() {
                    self.mark_node(NodeTuple::from_check(after), ChangeKind::Indirect);
                } else {
                    self.mark_service(ServiceTuple::from_check(after), ServiceMark::indirect());
                    if before.service_id != after.service_id {
                        self.mark_service(
                            ServiceTuple::from_check(before),
                            ServiceMark::indirect(),
                        );
                    }
                }
            }
            Delta::Created(check) | Delta::Deleted(check) => {
                if check.is_node_scoped() {
                    self.mark_node(NodeTuple::from_check(check), ChangeKind::Indirect);
                } else {
                    self.mark_service(ServiceTuple::from_check(check), ServiceMark::indirect());
                }
            }
        }
    }
}
