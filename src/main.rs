//! barman-exporter - version 0.1.0
//!
//! Prometheus exporter for barman check results with tracing logging.
//! This is the main entry point that wires the poller, the config watcher
//! and the HTTP server together.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};

use barman_exporter::cli::{version_info, Args, LogLevel};
use barman_exporter::config::{
    find_config_file, resolve_config, show_config, validate_effective_config, DEFAULT_BIND_ADDR,
    DEFAULT_EVENT_QUEUE_SIZE, DEFAULT_PORT, DEFAULT_SCRAPE_INTERVAL,
};
use barman_exporter::handlers::router;
use barman_exporter::health_stats::HealthStats;
use barman_exporter::metrics::MetricsRegistry;
use barman_exporter::poller::Poller;
use barman_exporter::runner::SudoRunner;
use barman_exporter::startup_checks;
use barman_exporter::state::AppState;
use barman_exporter::watcher::ConfigWatcher;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.version {
        print!("{}", version_info());
        return Ok(());
    }

    let config = resolve_config(&args)?;

    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        return show_config(&config, args.config_format);
    }

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&args);

    info!("Starting barman-exporter");

    if !args.no_config {
        if let Ok(Some(path)) = find_config_file(args.config.as_deref()) {
            info!("Loaded configuration from: {}", path.display());
        }
    }

    if let Err(e) = startup_checks::validate_requirements(&config) {
        warn!("Startup validation failed: {}", e);
        warn!("   The exporter will start but checks may fail!");
    }

    let registry = Arc::new(MetricsRegistry::new()?);
    let health_stats = Arc::new(HealthStats::new());
    let runner = Arc::new(SudoRunner::from_config(&config));
    let poller = Arc::new(Poller::new(
        runner,
        registry.clone(),
        health_stats.clone(),
        config.parallel_check.unwrap_or(false),
    ));

    let config_dir = config.barman_config_dir();
    let watcher = match ConfigWatcher::new(
        &config_dir,
        config.event_queue_size.unwrap_or(DEFAULT_EVENT_QUEUE_SIZE),
    ) {
        Ok(watcher) => watcher,
        Err(e) => {
            error!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let interval = Duration::from_secs(config.scrape_interval.unwrap_or(DEFAULT_SCRAPE_INTERVAL));

    let watcher_task = tokio::spawn(watcher.run(poller.clone(), cancel.child_token()));
    let poller_task = tokio::spawn(poller.clone().run(interval, cancel.child_token()));

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let state = Arc::new(AppState {
        registry,
        health_stats,
        config: Arc::new(config.clone()),
        start_time: Instant::now(),
    });
    let app = router(state);

    match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("barman-exporter listening on http://{}:{}", bind_ip_str, port);

            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                error!("http listener failed with error: {}", e);
                // Checks keep running even without a working endpoint
                shutdown_signal().await;
            }
        }
        Err(e) => {
            error!("http listener failed with error: {}", e);
            warn!("Metrics are not reachable; checks keep running until shutdown");
            shutdown_signal().await;
        }
    }

    cancel.cancel();
    for (name, task) in [("watcher", watcher_task), ("poller", poller_task)] {
        if let Err(e) = task.await {
            error!("{} task failed: {}", name, e);
        }
    }

    info!("barman-exporter stopped gracefully");
    Ok(())
}
