//! Routes exposed by the optional health server.
//!
//! - `GET /healthz` — liveness
//! - `GET /readyz`  — readiness (SQLite + storage root)

use crate::handlers::health_handlers::{HealthState, healthz, readyz};
use axum::{Router, routing::get};

/// Build the health router, carrying `HealthState` to the readiness check.
pub fn routes() -> Router<HealthState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
