use serde::{Deserialize, Serialize};

use crate::scope::Scope;

/// A key/value entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub key: String,
    #[serde(default)]
    pub value: Vec<u8>,
    #[serde(default)]
    pub flags: u64,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub lock_index: u64,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl DirEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            flags: 0,
            session: None,
            lock_index: 0,
            scope: Scope::default(),
            create_index: 0,
            modify_index: 0,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

/// Marker left behind when a key is deleted, carrying the delete's index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub key: String,
    pub index: u64,
    #[serde(default)]
    pub scope: Scope,
}
