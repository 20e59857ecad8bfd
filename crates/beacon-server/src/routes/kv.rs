use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use beacon_core::{DirEntry, Scope};

use crate::routes::{core_error_response, storage_error_response, INDEX_HEADER};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/kv/{*key}", get(get_kv).put(put_kv).delete(delete_kv))
}

#[derive(Deserialize)]
pub struct KvQuery {
    /// Treat the key as a prefix.
    #[serde(default)]
    recurse: bool,
    /// Apply only if the entry's modify index matches. 0 means "must not exist"
    /// for writes.
    #[serde(default)]
    cas: Option<u64>,
    #[serde(default)]
    flags: u64,
    #[serde(default)]
    partition: String,
    #[serde(default)]
    namespace: String,
}

impl KvQuery {
    fn scope(&self) -> Scope {
        Scope::new(&self.partition, &self.namespace)
    }
}

fn with_index(index: u64, status: StatusCode, body: impl IntoResponse) -> Response {
    (status, [(INDEX_HEADER, index.to_string())], body).into_response()
}

async fn get_kv(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<KvQuery>,
) -> Response {
    let scope = query.scope();
    let (index, entries) = if query.recurse {
        match state.store.kvs_list(&key, &scope) {
            Ok(r) => r,
            Err(e) => return storage_error_response(&e),
        }
    } else {
        match state.store.kvs_get(&key, &scope) {
            Ok((index, entry)) => (index, entry.into_iter().collect()),
            Err(e) => return storage_error_response(&e),
        }
    };

    if entries.is_empty() {
        return with_index(index, StatusCode::NOT_FOUND, "Key not found");
    }
    with_index(index, StatusCode::OK, Json(entries))
}

async fn put_kv(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<KvQuery>,
    body: Bytes,
) -> Response {
    let mut entry = DirEntry::new(key, body.to_vec()).with_scope(query.scope());
    entry.flags = query.flags;

    let result = match query.cas {
        Some(cas) => {
            entry.modify_index = cas;
            state.store.kvs_set_cas(&entry)
        }
        None => state.store.kvs_set(&entry).map(|index| (true, index)),
    };

    match result {
        Ok((applied, index)) => with_index(index, StatusCode::OK, Json(applied)),
        Err(e) => core_error_response(&e),
    }
}

async fn delete_kv(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<KvQuery>,
) -> Response {
    let scope = query.scope();
    let result = if query.recurse {
        state
            .store
            .kvs_delete_tree(&key, &scope)
            .map(|index| (true, index))
    } else if let Some(cas) = query.cas {
        state
            .store
            .kvs_delete_cas(&key, cas, &scope)
            .map(|applied| (applied, state.store.latest_index()))
    } else {
        state.store.kvs_delete(&key, &scope).map(|index| (true, index))
    };

    match result {
        Ok((applied, index)) => with_index(index, StatusCode::OK, Json(applied)),
        Err(e) => core_error_response(&e),
    }
}
