//! CLI arguments for barman-exporter.
//!
//! This module defines the command-line interface structure using the clap library.
//! Paths and the barman user name come from the environment (see `config`).

use clap::{Parser, ValueEnum};
use std::fmt::Write as FmtWrite;
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

const ENV_HELP: &str = "Supported env variables:
  SUDO_BINARY_PATH   - path to sudo binary (default: /usr/bin/sudo)
  BARMAN_BINARY_PATH - path to barman binary (default: /usr/bin/barman)
  BARMAN_USER_NAME   - user barman is executed as (default: barman)
  BARMAN_CONFIG_DIR  - directory with user defined config files (default: /etc/barman.d)";

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "barman-exporter",
    about = "Prometheus exporter for barman check results",
    long_about = "Prometheus exporter for barman check results.\n\n\
                  Periodically runs `barman check` for every configured server and publishes \
                  the exit code as barman_check_exit_code{backup=...}. Metrics are reset and \
                  refreshed whenever the barman configuration directory changes.",
    disable_version_flag = true,
    after_help = ENV_HELP
)]
pub struct Args {
    /// Show version and build information, then exit
    #[arg(long)]
    pub version: bool,

    /// Check different backup servers in parallel (`--parallel-check=false` disables)
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        require_equals = true
    )]
    pub parallel_check: Option<bool>,

    /// Exporter metrics update interval in seconds
    #[arg(long, value_name = "SECONDS")]
    pub scrape_interval: Option<u64>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

/// Renders the `--version` output: package version, git commit and build time.
pub fn version_info() -> String {
    let mut out = String::new();
    writeln!(out, "{:<12}{}", "version:", env!("CARGO_PKG_VERSION")).ok();
    writeln!(
        out,
        "{:<12}{}",
        "git commit:",
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    )
    .ok();
    if let Some(built) = option_env!("VERGEN_BUILD_TIMESTAMP") {
        writeln!(out, "{:<12}{}", "built:", built).ok();
    }
    out
}
