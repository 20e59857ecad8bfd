use serde::{Deserialize, Serialize};

use beacon_core::{Event, Scope, Topic};

/// What a subscriber wants to follow: one routing key on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub topic: Topic,
    pub key: String,
    #[serde(default)]
    pub scope: Scope,
}

impl SubscribeRequest {
    pub fn new(topic: Topic, key: impl Into<String>) -> Self {
        Self {
            topic,
            key: key.into(),
            scope: Scope::default(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn is_connect(&self) -> bool {
        self.topic == Topic::ServiceHealthConnect
    }

    pub fn matches(&self, event: &Event) -> bool {
        event.topic == self.topic
            && event.key() == Some(self.key.as_str())
            && event.payload.value.scope() == self.scope
    }
}
