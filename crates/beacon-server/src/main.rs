use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use beacon_db::{init_database, RedbDumpStore};
use beacon_server::tasks::{persist_if_changed, restore_latest, run_event_logger, run_persistence};
use beacon_server::{create_router, AppState, Config};
use beacon_state::run_reaper;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!(
                "Optional: BEACON_LISTEN_ADDR, BEACON_DB_PATH, BEACON_TOMBSTONE_TTL_SECS, \
                 BEACON_TOMBSTONE_GRANULARITY_SECS, BEACON_PERSIST_INTERVAL_SECS, BEACON_EVENT_BUFFER"
            );
            std::process::exit(1);
        }
    };

    tracing::info!("Starting Beacon server");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Database path: {}", config.db_path.display());

    // Initialize database
    let db = match init_database(&config.db_path) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "failed to open database");
            std::process::exit(1);
        }
    };
    let dumps = Arc::new(RedbDumpStore::new(db));

    let (state, expired) = match AppState::new(&config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to start tombstone GC");
            std::process::exit(1);
        }
    };

    match restore_latest(&state.store, &dumps) {
        Ok(Some(index)) => tracing::info!(index, "restored state"),
        Ok(None) => tracing::info!("no saved state, starting empty"),
        Err(e) => {
            tracing::error!(error = %e, "failed to restore state");
            std::process::exit(1);
        }
    }

    tokio::spawn(run_reaper(state.store.clone(), expired));
    tokio::spawn(run_event_logger(state.publisher.clone()));
    tokio::spawn(run_persistence(
        state.store.clone(),
        dumps.clone(),
        config.persist_interval,
    ));

    let store = state.store.clone();
    let app = create_router(state);

    // Start server
    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind {}", config.listen_addr);
            std::process::exit(1);
        }
    };

    tracing::info!("Server running at http://{}", config.listen_addr);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    if let Err(e) = persist_if_changed(&store, &dumps, 0) {
        tracing::error!(error = %e, "failed to persist state on shutdown");
    }
}
