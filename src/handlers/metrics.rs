//! Metrics endpoint handler for Prometheus scraping.
//!
//! This module provides the `/metrics` endpoint handler. It never runs barman
//! itself; it only encodes whatever the poller last wrote into the registry.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use prometheus::TEXT_FORMAT;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, MetricsError> {
    debug!("Processing /metrics request");
    state.health_stats.record_http_request();

    let body = state.registry.encode().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        MetricsError::EncodingFailed
    })?;

    Ok(([(header::CONTENT_TYPE, TEXT_FORMAT)], body))
}
