//! Shared helpers for integration tests: a scripted barman runner.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use barman_exporter::health_stats::HealthStats;
use barman_exporter::metrics::MetricsRegistry;
use barman_exporter::poller::Poller;
use barman_exporter::runner::{CommandOutput, CommandRunner, RunnerError, CHECK_ARG};

/// Fake barman that answers from a script and records every call.
#[derive(Default)]
pub struct ScriptedRunner {
    listing: Mutex<Option<String>>,
    listing_stderr: Mutex<String>,
    failing: Mutex<HashSet<String>>,
    unreachable: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Vec<String>>>,
    /// Registry size observed at the start of each check call.
    observed: Mutex<Vec<usize>>,
    observe: Mutex<Option<Arc<MetricsRegistry>>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedRunner {
    /// Runner whose `list-server --minimal` prints `listing` and exits 0.
    pub fn new(listing: &str) -> Self {
        let runner = Self::default();
        runner.set_listing(listing);
        runner
    }

    pub fn set_listing(&self, listing: &str) {
        *self.listing.lock().unwrap() = Some(listing.to_string());
    }

    /// Extra text `list-server` writes to stderr on success.
    pub fn set_listing_stderr(&self, stderr: &str) {
        *self.listing_stderr.lock().unwrap() = stderr.to_string();
    }

    /// Makes `list-server` exit non-zero.
    pub fn fail_listing(&self) {
        *self.listing.lock().unwrap() = None;
    }

    /// Makes `check <server>` exit 1.
    pub fn fail_check(&self, server: &str) {
        self.failing.lock().unwrap().insert(server.to_string());
    }

    /// Makes `check <server>` fail to spawn.
    pub fn break_check(&self, server: &str) {
        self.unreachable.lock().unwrap().insert(server.to_string());
    }

    /// Records the registry size at every check call.
    pub fn observe(&self, registry: Arc<MetricsRegistry>) {
        *self.observe.lock().unwrap() = Some(registry);
    }

    /// Blocks every check until a permit is added to the returned semaphore.
    pub fn gate_checks(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Servers passed to `check`, in call order.
    pub fn checked(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.first().map(String::as_str) == Some(CHECK_ARG))
            .filter_map(|c| c.get(1).cloned())
            .collect()
    }

    pub fn observed(&self) -> Vec<usize> {
        self.observed.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
        self.observed.lock().unwrap().clear();
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, RunnerError> {
        self.calls
            .lock()
            .unwrap()
            .push(args.iter().map(|a| a.to_string()).collect());

        if args.first() != Some(&CHECK_ARG) {
            return Ok(match self.listing.lock().unwrap().clone() {
                Some(stdout) => CommandOutput {
                    code: Some(0),
                    stdout,
                    stderr: self.listing_stderr.lock().unwrap().clone(),
                },
                None => CommandOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "ERROR: cannot read configuration\n".into(),
                },
            });
        }

        let server = args.get(1).copied().unwrap_or_default().to_string();

        let observed = self.observe.lock().unwrap().clone();
        if let Some(registry) = observed {
            self.observed.lock().unwrap().push(registry.len());
        }

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.unreachable.lock().unwrap().contains(&server) {
            return Err(RunnerError::Spawn {
                command: format!("barman check {server}"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        let code = if self.failing.lock().unwrap().contains(&server) {
            1
        } else {
            0
        };
        Ok(CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

pub struct Harness {
    pub runner: Arc<ScriptedRunner>,
    pub registry: Arc<MetricsRegistry>,
    pub stats: Arc<HealthStats>,
    pub poller: Arc<Poller<ScriptedRunner>>,
}

pub fn harness(listing: &str, parallel: bool) -> Harness {
    let runner = Arc::new(ScriptedRunner::new(listing));
    let registry = Arc::new(MetricsRegistry::new().unwrap());
    let stats = Arc::new(HealthStats::new());
    let poller = Arc::new(Poller::new(
        runner.clone(),
        registry.clone(),
        stats.clone(),
        parallel,
    ));
    Harness {
        runner,
        registry,
        stats,
        poller,
    }
}

/// Polls `cond` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
