//! Periodic barman check cycles.
//!
//! A cycle lists the configured servers with `barman list-server --minimal`
//! and runs `barman check <server>` for each of them, writing the exit status
//! into the shared [`MetricsRegistry`]. The [`Poller::run`] loop repeats that on a
//! fixed interval; the config watcher calls [`Poller::run_cycle`] directly after
//! resetting the registry.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument, Span};

use crate::health_stats::{CycleSummary, HealthStats};
use crate::metrics::{CheckStatus, Generation, MetricsRegistry};
use crate::runner::{CommandRunner, CHECK_ARG, LIST_SERVERS_ARGS};

/// What started a check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Interval,
    ConfigChange,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Interval => write!(f, "interval"),
            Trigger::ConfigChange => write!(f, "config_change"),
        }
    }
}

/// Splits `list-server --minimal` output into server names.
///
/// One trailing newline is dropped; every other line is a server name taken
/// verbatim, so blank lines in the middle become empty names.
pub fn parse_server_list(output: &str) -> Vec<String> {
    let body = output.strip_suffix('\n').unwrap_or(output);
    if body.is_empty() {
        return Vec::new();
    }
    body.split('\n').map(str::to_string).collect()
}

struct CheckOutcome {
    status: CheckStatus,
    applied: bool,
}

/// Runs `barman check` for one server and records the result.
async fn check_server<R: CommandRunner>(
    runner: &R,
    registry: &MetricsRegistry,
    generation: Generation,
    server: &str,
) -> CheckOutcome {
    debug!(backup = server, "get metric");

    let status = match runner.run(&[CHECK_ARG, server]).await {
        Ok(output) if output.success() => CheckStatus::Ok,
        Ok(output) => {
            warn!(
                backup = server,
                "check failed: {}: {}",
                output.exit_description(),
                output.combined().trim_end()
            );
            CheckStatus::Failed
        }
        Err(e) => {
            warn!(backup = server, "check failed: {}", e);
            CheckStatus::Failed
        }
    };

    let applied = registry.set_if_current(generation, server, status);
    if applied {
        debug!(backup = server, %status, "got metric");
    } else {
        debug!(backup = server, %status, "metrics were reset during check, result discarded");
    }

    CheckOutcome { status, applied }
}

/// Drives check cycles against a [`CommandRunner`].
pub struct Poller<R> {
    runner: Arc<R>,
    registry: Arc<MetricsRegistry>,
    stats: Arc<HealthStats>,
    parallel: bool,
}

impl<R: CommandRunner> Poller<R> {
    pub fn new(
        runner: Arc<R>,
        registry: Arc<MetricsRegistry>,
        stats: Arc<HealthStats>,
        parallel: bool,
    ) -> Self {
        Self {
            runner,
            registry,
            stats,
            parallel,
        }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Lists the configured servers. `None` if the listing command failed.
    pub async fn list_servers(&self) -> Option<Vec<String>> {
        match self.runner.run(&LIST_SERVERS_ARGS).await {
            Ok(output) if output.success() => {
                if !output.stderr.is_empty() {
                    debug!("list-server stderr: {}", output.stderr.trim_end());
                }
                Some(parse_server_list(&output.stdout))
            }
            Ok(output) => {
                warn!(
                    "giving backups list failed: {}: {}",
                    output.exit_description(),
                    output.combined().trim_end()
                );
                None
            }
            Err(e) => {
                warn!("giving backups list failed: {}", e);
                None
            }
        }
    }

    /// Runs one full check cycle: list servers, then check each of them.
    ///
    /// Listing failures are logged and leave the registry untouched.
    #[instrument(skip(self), fields(cycle = Utc::now().timestamp()))]
    pub async fn run_cycle(&self, trigger: Trigger) -> CycleSummary {
        let start = Instant::now();
        let generation = self.registry.generation();

        let (listing_ok, servers) = match self.list_servers().await {
            Some(servers) => (true, servers),
            None => (false, Vec::new()),
        };

        info!("prepared backups list: {:?}", servers);

        let outcomes = if self.parallel {
            self.check_parallel(generation, &servers).await
        } else {
            let mut outcomes = Vec::with_capacity(servers.len());
            for server in &servers {
                outcomes
                    .push(check_server(&*self.runner, &self.registry, generation, server).await);
            }
            outcomes
        };

        let summary = CycleSummary {
            trigger,
            listing_ok,
            targets: servers.len(),
            failed: outcomes
                .iter()
                .filter(|o| o.status == CheckStatus::Failed)
                .count(),
            discarded: outcomes.iter().filter(|o| !o.applied).count(),
            duration: start.elapsed(),
            finished_at: Utc::now(),
        };

        self.stats.record_cycle(&summary);

        info!(
            targets = summary.targets,
            failed = summary.failed,
            duration_ms = summary.duration.as_millis() as u64,
            "check completed"
        );

        summary
    }

    async fn check_parallel(&self, generation: Generation, servers: &[String]) -> Vec<CheckOutcome> {
        let mut tasks = JoinSet::new();
        for server in servers {
            let runner = self.runner.clone();
            let registry = self.registry.clone();
            let server = server.clone();
            tasks.spawn(
                async move { check_server(&*runner, &registry, generation, &server).await }
                    .instrument(Span::current()),
            );
        }

        let mut outcomes = Vec::with_capacity(servers.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("check task failed: {}", e),
            }
        }
        outcomes
    }

    /// Runs a cycle, sleeps `interval`, and repeats until `cancel` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(
            interval_secs = interval.as_secs(),
            parallel = self.parallel,
            "periodic check task started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.run_cycle(Trigger::Interval) => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("periodic check task stopped");
    }
}
