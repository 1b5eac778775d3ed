//! Health statistics for the exporter.
//!
//! This module tracks check cycle outcomes and HTTP request counts and renders
//! them as the plain-text table served on `/health`.

use chrono::{DateTime, Utc};
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::poller::Trigger;

/// Outcome of one completed check cycle.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub trigger: Trigger,
    pub listing_ok: bool,
    pub targets: usize,
    pub failed: usize,
    /// Results dropped because a reset overtook the cycle.
    pub discarded: usize,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Exporter health statistics shared between the poller and the HTTP handlers.
pub struct HealthStats {
    pub cycles_total: AtomicU64,
    pub config_refreshes_total: AtomicU64,
    pub list_failures_total: AtomicU64,
    pub check_failures_total: AtomicU64,
    pub discarded_results_total: AtomicU64,
    pub http_requests_total: AtomicU64,
    cycle_duration_seconds: Mutex<RunningStat>,
    last_cycle: Mutex<Option<CycleSummary>>,
    start_time: Instant,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            config_refreshes_total: AtomicU64::new(0),
            list_failures_total: AtomicU64::new(0),
            check_failures_total: AtomicU64::new(0),
            discarded_results_total: AtomicU64::new(0),
            http_requests_total: AtomicU64::new(0),
            cycle_duration_seconds: Mutex::new(RunningStat::default()),
            last_cycle: Mutex::new(None),
            start_time: Instant::now(),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_cycle(&self, summary: &CycleSummary) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        if summary.trigger == Trigger::ConfigChange {
            self.config_refreshes_total.fetch_add(1, Ordering::Relaxed);
        }
        if !summary.listing_ok {
            self.list_failures_total.fetch_add(1, Ordering::Relaxed);
        }
        self.check_failures_total
            .fetch_add(summary.failed as u64, Ordering::Relaxed);
        self.discarded_results_total
            .fetch_add(summary.discarded as u64, Ordering::Relaxed);

        self.cycle_duration_seconds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(summary.duration.as_secs_f64());
        *self.last_cycle.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
    }

    pub fn record_http_request(&self) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_cycle(&self) -> Option<CycleSummary> {
        self.last_cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True once a cycle finished with a successful server listing.
    pub fn is_healthy(&self) -> bool {
        self.last_cycle().is_some_and(|c| c.listing_ok)
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let duration = *self
            .cycle_duration_seconds
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let last = self.last_cycle();

        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();

        writeln!(out, "CHECK CYCLES").ok();
        writeln!(out, "------------").ok();
        for (name, counter) in [
            ("cycles_total", &self.cycles_total),
            ("config_refreshes_total", &self.config_refreshes_total),
            ("list_failures_total", &self.list_failures_total),
            ("check_failures_total", &self.check_failures_total),
            ("discarded_results_total", &self.discarded_results_total),
        ] {
            writeln!(
                out,
                "{:left$} | {:>col$}",
                name,
                counter.load(Ordering::Relaxed),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "cycle_duration (s)",
            format!("{:.3}", duration.last),
            format!("{:.3}", duration.avg()),
            format!("{:.3}", duration.max),
            format!("{:.3}", duration.min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "LAST CYCLE").ok();
        writeln!(out, "----------").ok();
        match last {
            Some(c) => {
                let rows = [
                    ("finished_at", c.finished_at.to_rfc3339()),
                    ("trigger", c.trigger.to_string()),
                    ("listing_ok", c.listing_ok.to_string()),
                    ("targets", c.targets.to_string()),
                    ("failed", c.failed.to_string()),
                ];
                for (name, value) in rows {
                    writeln!(out, "{name:left_col$} | {value}").ok();
                }
            }
            None => {
                writeln!(out, "no cycle completed yet").ok();
            }
        }

        writeln!(out).ok();
        writeln!(
            out,
            "{:left$} | {}",
            "http_requests_total",
            self.http_requests_total.load(Ordering::Relaxed),
            left = left_col
        )
        .ok();

        out
    }
}
