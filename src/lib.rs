//! barman-exporter library
//!
//! Publishes `barman check` results as Prometheus gauges. The pieces are
//! wired together by the binary in `main.rs`:
//!
//! - [`runner`]: executes `sudo --user=<user> barman ...` behind the
//!   [`runner::CommandRunner`] trait
//! - [`poller`]: check cycles on a fixed interval
//! - [`watcher`]: resets and refreshes metrics when the barman config
//!   directory changes
//! - [`metrics`]: the shared, mutex-guarded `barman_check_exit_code` registry
//! - [`handlers`]: the axum HTTP surface
//!
//! # Usage
//!
//! ```rust
//! use barman_exporter::metrics::{CheckStatus, MetricsRegistry};
//!
//! let registry = MetricsRegistry::new().unwrap();
//! registry.set("main", CheckStatus::Ok);
//! registry.set("replica", CheckStatus::Failed);
//!
//! let text = registry.encode().unwrap();
//! assert!(text.contains("barman_check_exit_code{backup=\"replica\"} 1"));
//! ```

pub mod cli;
pub mod config;
pub mod handlers;
pub mod health_stats;
pub mod metrics;
pub mod poller;
pub mod runner;
pub mod startup_checks;
pub mod state;
pub mod watcher;
