use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Missing node registration: {0}")]
    MissingNode(String),

    #[error("Missing service registration: node={node}, service={service_id}")]
    MissingService { node: String, service_id: String },

    #[error("Invalid record: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Failures while deriving events from a change set.
///
/// Any of these aborts event publication for the whole transaction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("failed rebuilding events for node {node}: {source}")]
    NodeRecompute { node: String, source: StorageError },

    #[error("failed rebuilding event for service {service_id} on node {node}: {source}")]
    ServiceRecompute {
        node: String,
        service_id: String,
        source: StorageError,
    },

    #[error("node {node} was deleted but {count} service instance(s) are still registered on it")]
    OrphanedServices { node: String, count: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
