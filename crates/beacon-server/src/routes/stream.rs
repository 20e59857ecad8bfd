use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use beacon_core::{Event, Scope, Topic};
use beacon_stream::{service_health_snapshot, SubscribeRequest};

use crate::routes::{storage_error_response, INDEX_HEADER};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/health/service/{service}", get(service_health))
}

#[derive(Deserialize)]
pub struct HealthQuery {
    /// Return the instances that accept connect traffic for the service.
    #[serde(default)]
    connect: bool,
    #[serde(default)]
    partition: String,
    #[serde(default)]
    namespace: String,
}

#[derive(Serialize)]
struct SnapshotResponse {
    index: u64,
    events: Vec<Event>,
}

async fn service_health(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<HealthQuery>,
) -> Response {
    let topic = if query.connect {
        Topic::ServiceHealthConnect
    } else {
        Topic::ServiceHealth
    };
    let req = SubscribeRequest::new(topic, service)
        .with_scope(Scope::new(query.partition, query.namespace));

    let mut batches: Vec<Vec<Event>> = Vec::new();
    let index = match service_health_snapshot(&state.store.read_txn(), &req, &mut batches) {
        Ok(index) => index,
        Err(e) => return storage_error_response(&e),
    };

    let events = batches.into_iter().flatten().collect();
    (
        [(INDEX_HEADER, index.to_string())],
        Json(SnapshotResponse { index, events }),
    )
        .into_response()
}
