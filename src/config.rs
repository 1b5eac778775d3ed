//! Configuration management for barman-exporter.
//!
//! This module handles loading, merging, and validating configuration from files,
//! environment variables and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9706;
pub const DEFAULT_SCRAPE_INTERVAL: u64 = 60;
pub const DEFAULT_SUDO_BINARY_PATH: &str = "/usr/bin/sudo";
pub const DEFAULT_BARMAN_BINARY_PATH: &str = "/usr/bin/barman";
pub const DEFAULT_BARMAN_USER_NAME: &str = "barman";
pub const DEFAULT_BARMAN_CONFIG_DIR: &str = "/etc/barman.d";
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 64;

// Environment variable names
pub const ENV_SUDO_BINARY_PATH: &str = "SUDO_BINARY_PATH";
pub const ENV_BARMAN_BINARY_PATH: &str = "BARMAN_BINARY_PATH";
pub const ENV_BARMAN_USER_NAME: &str = "BARMAN_USER_NAME";
pub const ENV_BARMAN_CONFIG_DIR: &str = "BARMAN_CONFIG_DIR";

/// Effective exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // barman invocation
    #[serde(alias = "sudo-binary-path")]
    pub sudo_binary_path: Option<PathBuf>,
    #[serde(alias = "barman-binary-path")]
    pub barman_binary_path: Option<PathBuf>,
    #[serde(alias = "barman-user-name")]
    pub barman_user_name: Option<String>,
    #[serde(alias = "barman-config-dir")]
    pub barman_config_dir: Option<PathBuf>,

    // Polling
    #[serde(alias = "parallel-check")]
    pub parallel_check: Option<bool>,
    /// Seconds between check cycles
    #[serde(alias = "scrape-interval")]
    pub scrape_interval: Option<u64>,

    /// Capacity of the filesystem event queue feeding the config watcher
    #[serde(alias = "event-queue-size")]
    pub event_queue_size: Option<usize>,

    // Feature flags
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            sudo_binary_path: Some(PathBuf::from(DEFAULT_SUDO_BINARY_PATH)),
            barman_binary_path: Some(PathBuf::from(DEFAULT_BARMAN_BINARY_PATH)),
            barman_user_name: Some(DEFAULT_BARMAN_USER_NAME.into()),
            barman_config_dir: Some(PathBuf::from(DEFAULT_BARMAN_CONFIG_DIR)),
            parallel_check: Some(false),
            scrape_interval: Some(DEFAULT_SCRAPE_INTERVAL),
            event_queue_size: Some(DEFAULT_EVENT_QUEUE_SIZE),
            enable_health: Some(true),
        }
    }
}

impl Config {
    pub fn sudo_binary_path(&self) -> PathBuf {
        self.sudo_binary_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SUDO_BINARY_PATH))
    }

    pub fn barman_binary_path(&self) -> PathBuf {
        self.barman_binary_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BARMAN_BINARY_PATH))
    }

    pub fn barman_user_name(&self) -> String {
        self.barman_user_name
            .clone()
            .unwrap_or_else(|| DEFAULT_BARMAN_USER_NAME.to_string())
    }

    pub fn barman_config_dir(&self) -> PathBuf {
        self.barman_config_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BARMAN_CONFIG_DIR))
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<()> {
    if cfg.scrape_interval == Some(0) {
        bail!("scrape_interval must be at least 1 second");
    }

    if cfg.event_queue_size == Some(0) {
        bail!("event_queue_size must be at least 1");
    }

    if cfg
        .barman_user_name
        .as_deref()
        .is_some_and(|u| u.trim().is_empty())
    {
        bail!("barman_user_name must not be empty");
    }

    for (name, path) in [
        ("sudo_binary_path", &cfg.sudo_binary_path),
        ("barman_binary_path", &cfg.barman_binary_path),
        ("barman_config_dir", &cfg.barman_config_dir),
    ] {
        if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            bail!("{} must not be empty", name);
        }
    }

    if let Some(bind) = cfg.bind.as_deref() {
        if bind.parse::<std::net::IpAddr>().is_err() {
            bail!("Invalid bind address '{}'", bind);
        }
    }

    Ok(())
}

/// Applies the barman environment variables. Empty values count as unset.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = get(ENV_SUDO_BINARY_PATH) {
        config.sudo_binary_path = Some(PathBuf::from(v));
    }
    if let Some(v) = get(ENV_BARMAN_BINARY_PATH) {
        config.barman_binary_path = Some(PathBuf::from(v));
    }
    if let Some(v) = get(ENV_BARMAN_USER_NAME) {
        config.barman_user_name = Some(v);
    }
    if let Some(v) = get(ENV_BARMAN_CONFIG_DIR) {
        config.barman_config_dir = Some(PathBuf::from(v));
    }
}

/// Resolves configuration from CLI args, environment, config file, and defaults.
/// This enforces precedence: CLI (if provided) > environment > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    apply_cli_overrides(&mut config, args);

    Ok(config)
}

/// Applies CLI arguments on top of an already merged configuration.
pub fn apply_cli_overrides(config: &mut Config, args: &Args) {
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    // Only override port if the user supplied it on the CLI.
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(parallel) = args.parallel_check {
        config.parallel_check = Some(parallel);
    }

    if let Some(interval) = args.scrape_interval {
        config.scrape_interval = Some(interval);
    }
}

/// Locates the config file: the explicit path, or the first default location that exists.
pub fn find_config_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(p) = path {
        if !p.exists() {
            bail!("Config file not found: {}", p.display());
        }
        return Ok(Some(p.to_path_buf()));
    }

    // Try default locations
    let defaults = [
        "/etc/barman-exporter/barman-exporter.yaml",
        "/etc/barman-exporter/barman-exporter.yml",
        "/etc/barman-exporter/barman-exporter.json",
        "./barman-exporter.yaml",
        "./barman-exporter.yml",
        "./barman-exporter.json",
    ];

    Ok(defaults
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists()))
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = find_config_file(path)? else {
        return Ok(Config::default());
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?,
        // Default to YAML
        _ => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?,
    };

    Ok(config)
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<()> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}
