use beacon_core::{Event, ServiceKind, Topic};

/// Copy of a plain health event for the connect topic, if the instance
/// serves connect traffic. Proxies are routed by their destination.
pub fn connect_event(event: &Event) -> Option<Event> {
    let svc = event.service()?;
    let copy = event.clone().with_topic(Topic::ServiceHealthConnect);

    if svc.connect.native {
        return Some(copy);
    }
    match svc.kind {
        ServiceKind::ConnectProxy => {
            Some(copy.with_override_key(svc.proxy.destination_service_name.clone()))
        }
        _ => None,
    }
}

/// Connect topic duplicates for every plain health event in `events`.
pub fn connect_events(events: &[Event]) -> Vec<Event> {
    events
        .iter()
        .filter(|e| e.topic == Topic::ServiceHealth)
        .filter_map(connect_event)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{CatalogOp, CheckServiceNode, Node, Service};

    fn register(svc: Service) -> Event {
        Event::register(
            10,
            CheckServiceNode {
                node: Node::new(svc.node.clone(), "10.0.0.1"),
                service: Some(svc),
                checks: Vec::new(),
            },
        )
    }

    #[test]
    fn test_native_copied_unchanged() {
        let event = register(Service::new("node1", "web1", "web").connect_native());
        let out = connect_events(std::slice::from_ref(&event));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic, Topic::ServiceHealthConnect);
        assert_eq!(out[0].key(), Some("web"));
        assert_eq!(out[0].payload.value, event.payload.value);
    }

    #[test]
    fn test_proxy_routed_by_destination() {
        let event = register(Service::proxy("node1", "web-proxy", "web-sidecar", "web"));
        let out = connect_events(&[event]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key(), Some("web"));
        assert_eq!(out[0].op(), CatalogOp::Register);
    }

    #[test]
    fn test_other_kinds_ignored() {
        let mut gateway = Service::new("node1", "tgw", "tgw");
        gateway.kind = ServiceKind::TerminatingGateway;
        let events = vec![
            register(Service::new("node1", "web1", "web")),
            register(gateway),
        ];
        assert!(connect_events(&events).is_empty());
    }

    #[test]
    fn test_connect_topic_events_skipped() {
        let event = register(Service::new("node1", "web1", "web").connect_native())
            .with_topic(Topic::ServiceHealthConnect);
        assert!(connect_events(&[event]).is_empty());
    }

    #[test]
    fn test_deregister_duplicated() {
        let svc = Service::proxy("node1", "web-proxy", "web-sidecar", "web");
        let out = connect_events(&[Event::deregister(4, &svc)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].op(), CatalogOp::Deregister);
        assert_eq!(out[0].key(), Some("web"));
    }
}
