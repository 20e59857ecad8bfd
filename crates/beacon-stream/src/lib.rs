//! Beacon Stream - Service health events derived from catalog commits.

pub mod connect;
pub mod dirty;
pub mod events;
pub mod publisher;
pub mod snapshot;
pub mod subscribe;
pub mod view;

pub use connect::{connect_event, connect_events};
pub use dirty::{merge, DirtySet, NodeTuple, ServiceMark, ServiceTuple};
pub use events::service_health_events_from_changes;
pub use publisher::{EventPublisher, Subscription, SubscriptionError};
pub use snapshot::{service_health_snapshot, SnapshotAppender};
pub use subscribe::SubscribeRequest;
pub use view::ServiceHealthView;
