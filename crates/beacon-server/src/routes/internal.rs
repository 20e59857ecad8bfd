use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::routes::storage_error_response;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/internal/tombstones", get(tombstones))
}

#[derive(Serialize)]
struct TombstoneStatus {
    count: usize,
    max_index: u64,
    gc_enabled: bool,
    pending_expiration: bool,
    pending_buckets: usize,
}

async fn tombstones(State(state): State<AppState>) -> Response {
    let tx = state.store.read_txn();
    let stones = match state.store.graveyard().dump_txn(&tx) {
        Ok(stones) => stones,
        Err(e) => return storage_error_response(&e),
    };

    Json(TombstoneStatus {
        count: stones.len(),
        max_index: stones.iter().map(|t| t.index).max().unwrap_or(0),
        gc_enabled: state.gc.is_enabled(),
        pending_expiration: state.gc.pending_expiration(),
        pending_buckets: state.gc.pending_buckets(),
    })
    .into_response()
}
