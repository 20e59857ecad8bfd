use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scope::DEFAULT_PARTITION;

fn default_partition() -> String {
    DEFAULT_PARTITION.to_string()
}

/// A registered catalog node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub node: String,
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_partition")]
    pub partition: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl Node {
    pub fn new(node: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: None,
            node: node.into(),
            address: address.into(),
            partition: default_partition(),
            meta: BTreeMap::new(),
            create_index: 0,
            modify_index: 0,
        }
    }

    /// Minimal node carried by deregistration payloads.
    pub fn stub(node: impl Into<String>, partition: impl Into<String>) -> Self {
        let mut stub = Self::new(node, "");
        stub.partition = partition.into();
        stub
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Equal in everything but the raft indexes.
    pub fn is_same(&self, other: &Node) -> bool {
        self.id == other.id
            && self.node == other.node
            && self.address == other.address
            && self.partition == other.partition
            && self.meta == other.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_same_ignores_indexes() {
        let mut a = Node::new("node1", "10.0.0.1");
        let mut b = a.clone();
        a.modify_index = 3;
        b.modify_index = 9;
        assert!(a.is_same(&b));

        b.address = "10.0.0.2".to_string();
        assert!(!a.is_same(&b));
    }

    #[test]
    fn test_stub_has_no_address() {
        let stub = Node::stub("node1", "eu");
        assert_eq!(stub.node, "node1");
        assert_eq!(stub.partition, "eu");
        assert!(stub.address.is_empty());
        assert!(stub.meta.is_empty());
    }
}
