pub mod catalog;
pub mod health;
pub mod internal;
pub mod kv;
pub mod stream;

use axum::{
    http::{HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::trace::TraceLayer;

use beacon_core::{CoreError, EventError, StorageError};

use crate::state::AppState;

/// Response header carrying the index a result is consistent at.
pub const INDEX_HEADER: HeaderName = HeaderName::from_static("x-beacon-index");

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(catalog::routes())
        .merge(kv::routes())
        .merge(stream::routes())
        .merge(internal::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn storage_error_response(e: &StorageError) -> Response {
    match e {
        StorageError::Database(_) => {
            tracing::error!(error = %e, "storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Storage error: {}", e),
            )
                .into_response()
        }
        _ => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

pub(crate) fn core_error_response(e: &CoreError) -> Response {
    match e {
        CoreError::Storage(e) => storage_error_response(e),
        CoreError::Event(EventError::OrphanedServices { .. }) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        CoreError::Event(_) => {
            tracing::error!(error = %e, "event derivation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Event error: {}", e),
            )
                .into_response()
        }
    }
}
