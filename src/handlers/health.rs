//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! check cycle statistics as a plain-text table.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Formats an uptime in the largest sensible unit.
pub fn format_uptime(uptime_seconds: u64) -> String {
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    }
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.health_stats.record_http_request();

    let last_cycle = state.health_stats.last_cycle();

    // 200 only after a cycle managed to list servers
    let status = if state.health_stats.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let message = match &last_cycle {
        None => "Waiting for first check cycle",
        Some(c) if !c.listing_ok => "barman list-server failed",
        Some(c) if c.failed > 0 => "OK - some backups failing",
        Some(_) => "OK",
    };

    let uptime_str = format_uptime(state.health_stats.get_uptime_seconds());
    let table = state.health_stats.render_table();
    let backups = state.registry.len();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\nUptime: {uptime_str}\nExported backups: {backups}\n\n{table}"),
    )
}
