//! Liveness endpoint and health probe.
//!
//! The bot process serves `GET /health` for container orchestrators. The
//! probe side (`deployctl probe`) polls that endpoint on a fixed interval
//! and marks the container unhealthy after a run of consecutive failures.

mod probe;

use axum::Router;
use axum::routing::get;
use axum::Json;
use serde_json::{Value, json};

use crate::config::HEALTH_PATH;

pub use probe::{HealthCheck, HealthStatus, HealthTracker, ProbeError, probe_once, run_probe};

/// Builds the router with the liveness and index routes.
pub fn router() -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route("/", get(index))
}

/// GET /health - liveness probe
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn index() -> &'static str {
    "Bot is running!"
}
