use beacon_core::{Event, ReadTxn, StorageError, Table};
use beacon_state::check_service_node_txn;

use crate::connect::connect_event;
use crate::subscribe::SubscribeRequest;

/// Sink for snapshot output. Each call carries one independently encodable
/// batch.
pub trait SnapshotAppender {
    fn append(&mut self, events: Vec<Event>);
}

impl SnapshotAppender for Vec<Vec<Event>> {
    fn append(&mut self, events: Vec<Event>) {
        self.push(events);
    }
}

/// Write one register event per instance matching `req` into `buf` and
/// return the index the snapshot is consistent at.
///
/// Every later event for the same request has a greater index.
pub fn service_health_snapshot<R: ReadTxn + ?Sized>(
    tx: &R,
    req: &SubscribeRequest,
    buf: &mut dyn SnapshotAppender,
) -> Result<u64, StorageError> {
    let idx = tx.max_index(&[Table::Nodes, Table::Services, Table::Checks]);
    let services = if req.is_connect() {
        tx.connect_services(&req.key, &req.scope)?
    } else {
        tx.services_by_name(&req.key, &req.scope)?
    };

    for svc in &services {
        let event = Event::register(idx, check_service_node_txn(tx, svc)?);
        if !req.is_connect() {
            buf.append(vec![event]);
            continue;
        }
        if let Some(event) = connect_event(&event) {
            buf.append(vec![event]);
        }
    }

    tracing::debug!(
        topic = %req.topic,
        key = %req.key,
        index = idx,
        instances = services.len(),
        "built service health snapshot"
    );
    Ok(idx)
}
