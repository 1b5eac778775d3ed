//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers. The same registry and statistics are held by the
//! poller and the config watcher.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::health_stats::HealthStats;
use crate::metrics::MetricsRegistry;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// State shared across HTTP requests.
pub struct AppState {
    pub registry: Arc<MetricsRegistry>,
    pub health_stats: Arc<HealthStats>,
    pub config: Arc<Config>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
