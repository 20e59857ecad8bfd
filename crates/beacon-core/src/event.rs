use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::check::HealthCheck;
use crate::node::Node;
use crate::scope::Scope;
use crate::service::Service;

/// Event stream category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    ServiceHealth,
    ServiceHealthConnect,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::ServiceHealth => write!(f, "service-health"),
            Topic::ServiceHealthConnect => write!(f, "service-health-connect"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogOp {
    Register,
    Deregister,
}

/// The joined view of one service instance: its node, the instance, and
/// every check that applies to it (node checks first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckServiceNode {
    pub node: Node,
    pub service: Option<Service>,
    pub checks: Vec<HealthCheck>,
}

impl CheckServiceNode {
    /// Scope the instance lives in; node placeholders use their partition.
    pub fn scope(&self) -> Scope {
        match &self.service {
            Some(svc) => svc.scope.clone(),
            None => Scope::in_partition(self.node.partition.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthPayload {
    pub op: CatalogOp,
    pub value: Arc<CheckServiceNode>,
    /// Replaces the service name as routing key (proxy destinations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_key: Option<String>,
}

impl ServiceHealthPayload {
    /// Routing key subscribers filter on; absent for node placeholders.
    pub fn routing_key(&self) -> Option<&str> {
        if let Some(key) = &self.override_key {
            return Some(key.as_str());
        }
        self.value.service.as_ref().map(|s| s.name.as_str())
    }
}

/// One materialized catalog event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: Topic,
    pub index: u64,
    pub payload: ServiceHealthPayload,
}

impl Event {
    /// Register event on the plain health topic.
    pub fn register(index: u64, csn: CheckServiceNode) -> Self {
        Self {
            topic: Topic::ServiceHealth,
            index,
            payload: ServiceHealthPayload {
                op: CatalogOp::Register,
                value: Arc::new(csn),
                override_key: None,
            },
        }
    }

    /// Deregister event for `service`: a node stub, the service, no checks.
    pub fn deregister(index: u64, service: &Service) -> Self {
        let csn = CheckServiceNode {
            node: Node::stub(service.node.clone(), service.scope.partition.clone()),
            service: Some(service.clone()),
            checks: Vec::new(),
        };
        Self {
            topic: Topic::ServiceHealth,
            index,
            payload: ServiceHealthPayload {
                op: CatalogOp::Deregister,
                value: Arc::new(csn),
                override_key: None,
            },
        }
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = topic;
        self
    }

    pub fn with_override_key(mut self, key: impl Into<String>) -> Self {
        self.payload.override_key = Some(key.into());
        self
    }

    pub fn op(&self) -> CatalogOp {
        self.payload.op
    }

    pub fn key(&self) -> Option<&str> {
        self.payload.routing_key()
    }

    pub fn service(&self) -> Option<&Service> {
        self.payload.value.service.as_ref()
    }
}
