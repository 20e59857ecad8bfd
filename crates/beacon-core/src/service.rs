use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scope::Scope;

/// Kind of service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    #[default]
    Typical,
    ConnectProxy,
    MeshGateway,
    TerminatingGateway,
    IngressGateway,
}

/// Sidecar proxy settings of a connect-proxy instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub destination_service_name: String,
    #[serde(default)]
    pub destination_service_id: String,
    #[serde(default)]
    pub local_service_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectConfig {
    #[serde(default)]
    pub native: bool,
}

/// One service instance registered on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub node: String,
    #[serde(default)]
    pub kind: ServiceKind,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub connect: ConnectConfig,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl Service {
    pub fn new(node: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            kind: ServiceKind::Typical,
            id: id.into(),
            name: name.into(),
            tags: Vec::new(),
            address: String::new(),
            port: 0,
            meta: BTreeMap::new(),
            proxy: ProxyConfig::default(),
            connect: ConnectConfig::default(),
            scope: Scope::default(),
            create_index: 0,
            modify_index: 0,
        }
    }

    /// A connect-proxy instance fronting `destination`.
    pub fn proxy(
        node: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        let mut svc = Self::new(node, id, name);
        svc.kind = ServiceKind::ConnectProxy;
        svc.proxy.destination_service_name = destination.into();
        svc
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn connect_native(mut self) -> Self {
        self.connect.native = true;
        self
    }

    pub fn is_connect_proxy(&self) -> bool {
        self.kind == ServiceKind::ConnectProxy
    }

    /// Equal in everything but the raft indexes.
    pub fn is_same(&self, other: &Service) -> bool {
        self.node == other.node
            && self.kind == other.kind
            && self.id == other.id
            && self.name == other.name
            && self.tags == other.tags
            && self.address == other.address
            && self.port == other.port
            && self.meta == other.meta
            && self.proxy == other.proxy
            && self.connect == other.connect
            && self.scope == other.scope
    }
}
