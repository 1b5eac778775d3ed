//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Landing page
//! - `/metrics`: Prometheus metrics endpoint
//! - `/health`: Health check endpoint

pub mod health;
pub mod metrics;
pub mod root;

use axum::{routing::get, Router};

use crate::state::SharedState;

// Re-export handlers
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;

/// Builds the exporter router.
pub fn router(state: SharedState) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler));

    if state.config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    app.with_state(state)
}
