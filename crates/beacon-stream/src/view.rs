use std::collections::BTreeMap;
use std::sync::Arc;

use beacon_core::{CatalogOp, CheckServiceNode, Event, Scope};

type InstanceKey = (String, String, Scope);

/// Subscriber-side state rebuilt from a snapshot and the events after it.
#[derive(Debug, Default)]
pub struct ServiceHealthView {
    index: u64,
    instances: BTreeMap<InstanceKey, Arc<CheckServiceNode>>,
}

impl ServiceHealthView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from snapshot output taken at `index`.
    pub fn from_snapshot(index: u64, batches: &[Vec<Event>]) -> Self {
        let mut view = Self::new();
        for event in batches.iter().flatten() {
            view.apply_event(event);
        }
        view.index = index;
        view
    }

    /// Apply one transaction's events. Batches at or below the current
    /// index are already reflected and are skipped.
    pub fn apply(&mut self, batch: &[Event]) {
        let Some(index) = batch.iter().map(|e| e.index).max() else {
            return;
        };
        if index <= self.index {
            return;
        }
        for event in batch {
            self.apply_event(event);
        }
        self.index = index;
    }

    fn apply_event(&mut self, event: &Event) {
        let csn = &event.payload.value;
        let Some(svc) = &csn.service else {
            return;
        };
        let key = (csn.node.node.to_lowercase(), svc.id.clone(), svc.scope.clone());
        match event.op() {
            CatalogOp::Register => {
                self.instances.insert(key, Arc::clone(csn));
            }
            CatalogOp::Deregister => {
                self.instances.remove(&key);
            }
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Current instances in key order.
    pub fn instances(&self) -> Vec<CheckServiceNode> {
        self.instances.values().map(|c| (**c).clone()).collect()
    }
}
