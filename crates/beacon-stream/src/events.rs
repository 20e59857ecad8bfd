//! Event materialization: one committed change set in, the minimal set of
//! service health events out.

use beacon_core::{
    ChangeKind, ChangeSet, Delta, Event, EventError, ReadTxn, Service, StorageError, Topic,
};
use beacon_state::{check_service_node_txn, join_checks};

use crate::connect::connect_events;
use crate::dirty::{DirtySet, NodeTuple, ServiceTuple};

/// Derive the events describing `changes`, reading current state from `tx`.
///
/// Node-level recomputation covers every instance on a dirty node, so
/// instance-level registers are skipped for those nodes. Deregistrations for
/// deletes, renames and proxy retargets are always emitted.
pub fn service_health_events_from_changes(
    tx: &dyn ReadTxn,
    changes: &ChangeSet,
) -> Result<Vec<Event>, EventError> {
    let idx = changes.index;
    let dirty = DirtySet::from_changes(changes);
    let mut events = Vec::new();

    for (node, kind) in &dirty.nodes {
        if *kind == ChangeKind::Delete {
            // the cascaded service deletes carry the deregistrations
            let remaining = tx.node_services(&node.node, &node.partition)?;
            if !remaining.is_empty() {
                return Err(EventError::OrphanedServices {
                    node: node.node.clone(),
                    count: remaining.len(),
                });
            }
            continue;
        }
        let node_events =
            events_for_node(tx, idx, node).map_err(|source| EventError::NodeRecompute {
                node: node.node.clone(),
                source,
            })?;
        events.extend(node_events);
    }

    for (tuple, mark) in &dirty.services {
        match &mark.delta {
            Some(Delta::Deleted(before)) => {
                events.push(Event::deregister(idx, before));
                continue;
            }
            Some(Delta::Updated { before, after }) => {
                if before.name != after.name {
                    events.push(Event::deregister(idx, before));
                }
                if let Some(e) = proxy_retarget_event(idx, before, after) {
                    events.push(e);
                }
            }
            _ => {}
        }

        if dirty.nodes.contains_key(&tuple.node_tuple()) {
            continue;
        }
        let event =
            event_for_service(tx, idx, tuple).map_err(|source| EventError::ServiceRecompute {
                node: tuple.node.clone(),
                service_id: tuple.service_id.clone(),
                source,
            })?;
        events.push(event);
    }

    let connect = connect_events(&events);
    events.extend(connect);

    tracing::debug!(
        index = idx,
        changes = changes.len(),
        events = events.len(),
        "materialized service health events"
    );
    Ok(events)
}

/// Register events for every instance on `node`.
fn events_for_node(
    tx: &dyn ReadTxn,
    idx: u64,
    node: &NodeTuple,
) -> Result<Vec<Event>, StorageError> {
    let services = tx.node_services(&node.node, &node.partition)?;
    let record = tx
        .get_node(&node.node, &node.partition)?
        .ok_or_else(|| StorageError::MissingNode(node.node.clone()))?;
    let checks = tx.node_checks(&node.node, &node.partition)?;

    Ok(services
        .into_iter()
        .map(|svc| Event::register(idx, join_checks(record.clone(), svc, &checks)))
        .collect())
}

fn event_for_service(
    tx: &dyn ReadTxn,
    idx: u64,
    tuple: &ServiceTuple,
) -> Result<Event, StorageError> {
    let svc = tx
        .get_service(&tuple.node, &tuple.service_id, &tuple.scope)?
        .ok_or_else(|| StorageError::MissingService {
            node: tuple.node.clone(),
            service_id: tuple.service_id.clone(),
        })?;
    Ok(Event::register(idx, check_service_node_txn(tx, &svc)?))
}

/// Connect deregistration keyed on the old destination of a retargeted proxy.
fn proxy_retarget_event(idx: u64, before: &Service, after: &Service) -> Option<Event> {
    if !before.is_connect_proxy()
        || before.proxy.destination_service_name == after.proxy.destination_service_name
    {
        return None;
    }
    Some(
        Event::deregister(idx, before)
            .with_topic(Topic::ServiceHealthConnect)
            .with_override_key(before.proxy.destination_service_name.clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{
        CatalogOp, HealthCheck, HealthStatus, Node, Scope, ServiceKind, WriteTxn,
    };
    use beacon_state::catalog::{
        delete_check_txn, delete_node_txn, delete_service_txn, ensure_check_txn,
        ensure_registration_txn, ensure_service_txn,
    };
    use beacon_state::{Registration, Store};

    fn derive<F>(store: &Store, f: F) -> Result<Vec<Event>, EventError>
    where
        F: FnOnce(&mut beacon_state::MemWriteTxn<'_>),
    {
        let mut tx = store.begin_write();
        f(&mut tx);
        let changes = tx.changes();
        let events = service_health_events_from_changes(&tx, &changes);
        if events.is_ok() {
            tx.commit().unwrap();
        }
        events
    }

    fn web_registration(node: &str, id: &str) -> Registration {
        Registration::new(Node::new(node, "10.0.0.1"))
            .with_service(Service::new(node, id, "web").with_port(8080))
            .with_check(HealthCheck::node_check(node, "serf").with_status(HealthStatus::Passing))
            .with_check(HealthCheck::service_check(node, format!("{id}-alive"), id))
    }

    fn summary(events: &[Event]) -> Vec<(Topic, CatalogOp, String, String)> {
        let mut out: Vec<_> = events
            .iter()
            .map(|e| {
                (
                    e.topic,
                    e.op(),
                    e.key().unwrap_or_default().to_string(),
                    e.service().map(|s| s.id.clone()).unwrap_or_default(),
                )
            })
            .collect();
        out.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
        out
    }

    fn entry(topic: Topic, op: CatalogOp, key: &str, id: &str) -> (Topic, CatalogOp, String, String) {
        (topic, op, key.to_string(), id.to_string())
    }

    fn sorted(mut v: Vec<(Topic, CatalogOp, String, String)>) -> Vec<(Topic, CatalogOp, String, String)> {
        v.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
        v
    }

    #[test]
    fn test_single_service_create_one_event() {
        let store = Store::new();
        store
            .ensure_registration(&Registration::new(Node::new("node1", "10.0.0.1")))
            .unwrap();

        let events = derive(&store, |tx| {
            ensure_service_txn(tx, &Service::new("node1", "web1", "web")).unwrap();
        })
        .unwrap();
        assert_eq!(
            summary(&events),
            vec![entry(Topic::ServiceHealth, CatalogOp::Register, "web", "web1")]
        );
        assert_eq!(events[0].index, 2);
    }

    #[test]
    fn test_connect_native_create_adds_connect_event() {
        let store = Store::new();
        store
            .ensure_registration(&Registration::new(Node::new("node1", "10.0.0.1")))
            .unwrap();

        let events = derive(&store, |tx| {
            ensure_service_txn(tx, &Service::new("node1", "web1", "web").connect_native())
                .unwrap();
        })
        .unwrap();
        assert_eq!(
            summary(&events),
            sorted(vec![
                entry(Topic::ServiceHealth, CatalogOp::Register, "web", "web1"),
                entry(Topic::ServiceHealthConnect, CatalogOp::Register, "web", "web1"),
            ])
        );
    }

    #[test]
    fn test_full_registration_coalesces_to_one_event_per_instance() {
        let store = Store::new();
        let events = derive(&store, |tx| {
            ensure_registration_txn(tx, &web_registration("node1", "web1")).unwrap();
        })
        .unwrap();
        assert_eq!(
            summary(&events),
            vec![entry(Topic::ServiceHealth, CatalogOp::Register, "web", "web1")]
        );
        let checks: Vec<&str> = events[0]
            .payload
            .value
            .checks
            .iter()
            .map(|c| c.check_id.as_str())
            .collect();
        assert_eq!(checks, vec!["serf", "web1-alive"]);
    }

    #[test]
    fn test_node_change_recomputes_every_instance() {
        let store = Store::new();
        store.ensure_registration(&web_registration("node1", "web1")).unwrap();
        store.ensure_registration(&web_registration("node1", "web2")).unwrap();
        store.ensure_registration(&web_registration("node2", "web3")).unwrap();

        let events = derive(&store, |tx| {
            let mut node = Node::new("node1", "10.0.0.99");
            node.meta.insert("rack".to_string(), "r1".to_string());
            ensure_registration_txn(tx, &Registration::new(node)).unwrap();
            // a service change on the same node must not duplicate
            ensure_service_txn(tx, &Service::new("node1", "web1", "web").with_port(9090))
                .unwrap();
        })
        .unwrap();

        assert_eq!(
            summary(&events),
            sorted(vec![
                entry(Topic::ServiceHealth, CatalogOp::Register, "web", "web1"),
                entry(Topic::ServiceHealth, CatalogOp::Register, "web", "web2"),
            ])
        );
        for e in &events {
            assert_eq!(e.payload.value.node.address, "10.0.0.99");
        }
    }

    #[test]
    fn test_node_check_change_recomputes_node() {
        let store = Store::new();
        store.ensure_registration(&web_registration("node1", "web1")).unwrap();
        store.ensure_registration(&web_registration("node1", "web2")).unwrap();

        let events = derive(&store, |tx| {
            ensure_check_txn(
                tx,
                &HealthCheck::node_check("node1", "serf").with_status(HealthStatus::Critical),
            )
            .unwrap();
        })
        .unwrap();
        assert_eq!(events.len(), 2);
        for e in &events {
            assert_eq!(e.payload.value.checks[0].status, HealthStatus::Critical);
        }
    }

    #[test]
    fn test_service_check_change_touches_one_instance() {
        let store = Store::new();
        store.ensure_registration(&web_registration("node1", "web1")).unwrap();
        store.ensure_registration(&web_registration("node1", "web2")).unwrap();

        let events = derive(&store, |tx| {
            ensure_check_txn(
                tx,
                &HealthCheck::service_check("node1", "web2-alive", "web2")
                    .with_status(HealthStatus::Passing),
            )
            .unwrap();
        })
        .unwrap();
        assert_eq!(
            summary(&events),
            vec![entry(Topic::ServiceHealth, CatalogOp::Register, "web", "web2")]
        );
    }

    #[test]
    fn test_check_moved_between_services_updates_both() {
        let store = Store::new();
        store.ensure_registration(&web_registration("node1", "web1")).unwrap();
        store.ensure_registration(&web_registration("node1", "web2")).unwrap();

        let events = derive(&store, |tx| {
            ensure_check_txn(tx, &HealthCheck::service_check("node1", "web1-alive", "web2"))
                .unwrap();
        })
        .unwrap();
        assert_eq!(
            summary(&events),
            sorted(vec![
                entry(Topic::ServiceHealth, CatalogOp::Register, "web", "web1"),
                entry(Topic::ServiceHealth, CatalogOp::Register, "web", "web2"),
            ])
        );
        let web1 = events
            .iter()
            .find(|e| e.service().map(|s| s.id.as_str()) == Some("web1"))
            .unwrap();
        assert_eq!(web1.payload.value.checks.len(), 1);
    }

    #[test]
    fn test_service_delete_emits_deregister() {
        let store = Store::new();
        store.ensure_registration(&web_registration("node1", "web1")).unwrap();

        let events = derive(&store, |tx| {
            delete_service_txn(tx, "node1", "web1", &Scope::default()).unwrap();
        })
        .unwrap();
        assert_eq!(
            summary(&events),
            vec![entry(Topic::ServiceHealth, CatalogOp::Deregister, "web", "web1")]
        );
        let payload = &events[0].payload.value;
        assert!(payload.checks.is_empty());
        assert_eq!(payload.node, Node::stub("node1", "default"));
    }

    #[test]
    fn test_node_delete_emits_deregister_per_instance() {
        let store = Store::new();
        store.ensure_registration(&web_registration("node1", "web1")).unwrap();
        store.ensure_registration(&web_registration("node1", "web2")).unwrap();

        let events = derive(&store, |tx| {
            delete_node_txn(tx, "node1", "").unwrap();
        })
        .unwrap();
        assert_eq!(
            summary(&events),
            sorted(vec![
                entry(Topic::ServiceHealth, CatalogOp::Deregister, "web", "web1"),
                entry(Topic::ServiceHealth, CatalogOp::Deregister, "web", "web2"),
            ])
        );
    }

    #[test]
    fn test_node_delete_without_service_cascade_is_error() {
        let store = Store::new();
        store.ensure_registration(&web_registration("node1", "web1")).unwrap();

        let err = derive(&store, |tx| {
            tx.delete_node("node1", "").unwrap();
        })
        .unwrap_err();
        assert_eq!(
            err,
            EventError::OrphanedServices {
                node: "node1".to_string(),
                count: 1
            }
        );
    }

    #[test]
    fn test_rename_deregisters_old_name() {
        let store = Store::new();
        store.ensure_registration(&web_registration("node1", "web1")).unwrap();

        let events = derive(&store, |tx| {
            ensure_service_txn(tx, &Service::new("node1", "web1", "api").with_port(8080))
                .unwrap();
        })
        .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].op(), CatalogOp::Deregister);
        assert_eq!(events[0].key(), Some("web"));
        assert_eq!(events[1].op(), CatalogOp::Register);
        assert_eq!(events[1].key(), Some("api"));
    }

    #[test]
    fn test_rename_deregister_emitted_when_node_dirty() {
        let store = Store::new();
        store.ensure_registration(&web_registration("node1", "web1")).unwrap();

        let events = derive(&store, |tx| {
            ensure_registration_txn(
                tx,
                &Registration::new(Node::new("node1", "10.0.0.2"))
                    .with_service(Service::new("node1", "web1", "api").with_port(8080)),
            )
            .unwrap();
        })
        .unwrap();
        assert_eq!(
            summary(&events),
            sorted(vec![
                entry(Topic::ServiceHealth, CatalogOp::Deregister, "web", "web1"),
                entry(Topic::ServiceHealth, CatalogOp::Register, "api", "web1"),
            ])
        );
    }

    #[test]
    fn test_proxy_retarget_deregisters_old_destination() {
        let store = Store::new();
        store
            .ensure_registration(
                &Registration::new(Node::new("node1", "10.0.0.1"))
                    .with_service(Service::proxy("node1", "sidecar", "sidecar", "a")),
            )
            .unwrap();

        let events = derive(&store, |tx| {
            ensure_service_txn(tx, &Service::proxy("node1", "sidecar", "sidecar", "b")).unwrap();
        })
        .unwrap();
        assert_eq!(
            summary(&events),
            sorted(vec![
                entry(Topic::ServiceHealthConnect, CatalogOp::Deregister, "a", "sidecar"),
                entry(Topic::ServiceHealth, CatalogOp::Register, "sidecar", "sidecar"),
                entry(Topic::ServiceHealthConnect, CatalogOp::Register, "b", "sidecar"),
            ])
        );
    }

    #[test]
    fn test_terminating_gateway_has_no_connect_event() {
        let store = Store::new();
        store
            .ensure_registration(&Registration::new(Node::new("node1", "10.0.0.1")))
            .unwrap();

        let events = derive(&store, |tx| {
            let mut gw = Service::new("node1", "tgw", "tgw");
            gw.kind = ServiceKind::TerminatingGateway;
            ensure_service_txn(tx, &gw).unwrap();
        })
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, Topic::ServiceHealth);
    }

    #[test]
    fn test_check_delete_then_service_delete_is_single_deregister() {
        let store = Store::new();
        store.ensure_registration(&web_registration("node1", "web1")).unwrap();

        let events = derive(&store, |tx| {
            delete_check_txn(tx, "node1", "web1-alive", &Scope::default()).unwrap();
            tx.delete_service("node1", "web1", &Scope::default()).unwrap();
        })
        .unwrap();
        assert_eq!(
            summary(&events),
            vec![entry(Topic::ServiceHealth, CatalogOp::Deregister, "web", "web1")]
        );
    }

    #[test]
    fn test_missing_node_is_service_recompute_error() {
        let store = Store::new();
        let err = derive(&store, |tx| {
            // bypass validation to break referential integrity
            tx.insert_service(Service::new("ghost", "web1", "web")).unwrap();
        })
        .unwrap_err();
        assert_eq!(
            err,
            EventError::ServiceRecompute {
                node: "ghost".to_string(),
                service_id: "web1".to_string(),
                source: StorageError::MissingNode("ghost".to_string()),
            }
        );
    }

    #[test]
    fn test_kv_changes_produce_no_events() {
        let store = Store::new();
        let events = derive(&store, |tx| {
            beacon_state::kvs::kvs_set_txn(tx, &beacon_core::DirEntry::new("foo", "bar"))
                .unwrap();
        })
        .unwrap();
        assert!(events.is_empty());
    }
}
