use serde::{Deserialize, Serialize};

use crate::scope::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Passing,
    Warning,
    #[default]
    Critical,
    Maintenance,
}

/// A health check attached to a node, or to one service instance on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub node: String,
    pub check_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: HealthStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub output: String,
    /// Empty for node-scoped checks.
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub service_tags: Vec<String>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl HealthCheck {
    pub fn node_check(node: impl Into<String>, check_id: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            check_id: check_id.into(),
            name: String::new(),
            status: HealthStatus::Critical,
            notes: String::new(),
            output: String::new(),
            service_id: String::new(),
            service_name: String::new(),
            service_tags: Vec::new(),
            scope: Scope::default(),
            create_index: 0,
            modify_index: 0,
        }
    }

    pub fn service_check(
        node: impl Into<String>,
        check_id: impl Into<String>,
        service_id: impl Into<String>,
    ) -> Self {
        let mut check = Self::node_check(node, check_id);
        check.service_id = service_id.into();
        check
    }

    pub fn with_status(mut self, status: HealthStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_node_scoped(&self) -> bool {
        self.service_id.is_empty()
    }

    /// Equal in everything but the raft indexes.
    pub fn is_same(&self, other: &HealthCheck) -> bool {
        self.node == other.node
            && self.check_id == other.check_id
            && self.name == other.name
            && self.status == other.status
            && self.notes == other.notes
            && self.output == other.output
            && self.service_id == other.service_id
            && self.service_name == other.service_name
            && self.service_tags == other.service_tags
            && self.scope == other.scope
    }
}
