use serde::{Deserialize, Serialize};

pub const DEFAULT_PARTITION: &str = "default";
pub const DEFAULT_NAMESPACE: &str = "default";

fn default_partition() -> String {
    DEFAULT_PARTITION.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Tenancy scope of a record: the partition and the namespace within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default = "default_partition")]
    pub partition: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            partition: default_partition(),
            namespace: default_namespace(),
        }
    }
}

impl Scope {
    pub fn new(partition: impl Into<String>, namespace: impl Into<String>) -> Self {
        let mut scope = Self {
            partition: partition.into(),
            namespace: namespace.into(),
        };
        scope.normalize();
        scope
    }

    /// Default namespace of the given partition.
    pub fn in_partition(partition: impl Into<String>) -> Self {
        Self::new(partition, DEFAULT_NAMESPACE)
    }

    /// Replace empty components with their defaults.
    pub fn normalize(&mut self) {
        if self.partition.is_empty() {
            self.partition = default_partition();
        }
        if self.namespace.is_empty() {
            self.namespace = default_namespace();
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.partition, self.namespace)
    }
}
