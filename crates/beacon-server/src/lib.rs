//! Beacon Server - catalog daemon with change streaming.

pub mod config;
pub mod routes;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use routes::create_router;
pub use state::AppState;
