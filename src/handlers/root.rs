//! Root endpoint handler for the landing page.

use axum::{extract::State, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");

    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;

    let mut body = format!(
        "barman-exporter {version}\n\
         Uptime: {hours}h {minutes}m {seconds}s\n\
         Config directory: {}\n\n\
         Endpoints:\n  /metrics  barman check exit codes (Prometheus text format)\n",
        state.config.barman_config_dir().display()
    );
    if state.config.enable_health.unwrap_or(true) {
        body.push_str("  /health   check cycle statistics\n");
    }

    ([("Content-Type", "text/plain; charset=utf-8")], body)
}
