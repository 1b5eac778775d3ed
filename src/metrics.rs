//! Prometheus metrics registry for barman check results.
//!
//! `MetricsRegistry` owns the `barman_check_exit_code` gauge family together with
//! the mutex that serializes every mutation of it. The poller, the config watcher
//! and the `/metrics` handler all share one instance through an `Arc`.
//!
//! Every `reset()` bumps a generation counter. A check cycle captures the
//! generation when it starts and writes through [`MetricsRegistry::set_if_current`],
//! so results of a cycle that was overtaken by a reset never resurrect labels
//! the reset just removed.

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const CHECK_EXIT_CODE_METRIC: &str = "barman_check_exit_code";
pub const CHECK_EXIT_CODE_HELP: &str = "barman check command exit code result.";
pub const BACKUP_LABEL: &str = "backup";

/// Result of a single `barman check` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Failed,
}

impl CheckStatus {
    /// Gauge value exported for this status (0 = success, 1 = failure).
    pub fn gauge_value(self) -> f64 {
        match self {
            CheckStatus::Ok => 0.0,
            CheckStatus::Failed => 1.0,
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Ok => write!(f, "ok"),
            CheckStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Identifies the registry contents between two resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

struct Inner {
    generation: Generation,
    values: BTreeMap<String, CheckStatus>,
}

/// Thread-safe label -> gauge store backing the `/metrics` endpoint.
pub struct MetricsRegistry {
    registry: Registry,
    check_exit_code: GaugeVec,
    inner: Mutex<Inner>,
}

impl MetricsRegistry {
    /// Creates the registry and registers the gauge family.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let check_exit_code = GaugeVec::new(
            Opts::new(CHECK_EXIT_CODE_METRIC, CHECK_EXIT_CODE_HELP),
            &[BACKUP_LABEL],
        )?;
        registry.register(Box::new(check_exit_code.clone()))?;

        Ok(Self {
            registry,
            check_exit_code,
            inner: Mutex::new(Inner {
                generation: Generation(0),
                values: BTreeMap::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves the map consistent, so a poisoned lock is usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current generation; captured by a check cycle before it starts writing.
    pub fn generation(&self) -> Generation {
        self.lock().generation
    }

    /// Upserts the status for `backup`. Immediately visible to readers.
    pub fn set(&self, backup: &str, status: CheckStatus) {
        let mut inner = self.lock();
        self.write(&mut inner, backup, status);
    }

    /// Upserts the status only if no reset happened since `generation`.
    /// Returns whether the value was written.
    pub fn set_if_current(&self, generation: Generation, backup: &str, status: CheckStatus) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        self.write(&mut inner, backup, status);
        true
    }

    fn write(&self, inner: &mut Inner, backup: &str, status: CheckStatus) {
        self.check_exit_code
            .with_label_values(&[backup])
            .set(status.gauge_value());
        inner.values.insert(backup.to_string(), status);
    }

    /// Removes every label and starts a new generation.
    pub fn reset(&self) -> Generation {
        let mut inner = self.lock();
        self.check_exit_code.reset();
        inner.values.clear();
        inner.generation = Generation(inner.generation.0 + 1);
        inner.generation
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> BTreeMap<String, CheckStatus> {
        self.lock().values.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let families = {
            let _guard = self.lock();
            self.registry.gather()
        };

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
