use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::put,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use beacon_core::{HealthCheck, Node, Scope, Service};
use beacon_state::Registration;

use crate::routes::core_error_response;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/catalog/register", put(register))
        .route("/v1/catalog/deregister", put(deregister))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    node: Node,
    #[serde(default)]
    service: Option<Service>,
    #[serde(default)]
    checks: Vec<HealthCheck>,
}

impl From<RegisterRequest> for Registration {
    fn from(req: RegisterRequest) -> Self {
        let node_name = req.node.node.clone();
        let mut reg = Registration::new(req.node);
        if let Some(mut svc) = req.service {
            svc.node = node_name.clone();
            reg = reg.with_service(svc);
        }
        for mut check in req.checks {
            check.node = node_name.clone();
            reg = reg.with_check(check);
        }
        reg
    }
}

/// Which records to remove. Without a service or check ID the whole node
/// goes, together with everything registered on it.
#[derive(Deserialize)]
pub struct DeregisterRequest {
    node: String,
    #[serde(default)]
    partition: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    service_id: Option<String>,
    #[serde(default)]
    check_id: Option<String>,
}

#[derive(Serialize)]
struct WriteResponse {
    index: u64,
}

async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> Response {
    let reg = Registration::from(req);
    match state.store.ensure_registration(&reg) {
        Ok(index) => Json(WriteResponse { index }).into_response(),
        Err(e) => core_error_response(&e),
    }
}

async fn deregister(
    State(state): State<AppState>,
    Json(req): Json<DeregisterRequest>,
) -> Response {
    let scope = Scope::new(&req.partition, &req.namespace);
    let result = match (&req.service_id, &req.check_id) {
        (Some(service_id), _) => state.store.delete_service(&req.node, service_id, &scope),
        (None, Some(check_id)) => state.store.delete_check(&req.node, check_id, &scope),
        (None, None) => state.store.delete_node(&req.node, &req.partition),
    };

    match result {
        Ok(index) => Json(WriteResponse { index }).into_response(),
        Err(e) => core_error_response(&e),
    }
}
