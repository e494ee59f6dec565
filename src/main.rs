//! CadHub Server: asynchronous CAD-to-glTF conversion service
//!
//! Main entry point that wires all crates together and starts the HTTP
//! gateway, the conversion workers, or both.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use cadhub_cache::Broker;
use cadhub_converter::{ConversionMetrics, Dispatcher};
use cadhub_core::config::AppConfig;
use cadhub_core::error::AppError;
use cadhub_service::StorageLayout;
use cadhub_worker::{
    ConversionJobHandler, CronScheduler, ExpiredJobPurge, WorkerRunner, WorkspaceSweepJob,
};

/// CadHub conversion service
#[derive(Debug, Parser)]
#[command(name = "cadhub-server", version, about)]
struct Cli {
    /// Configuration overlay to load from `config/{env}.toml`
    #[arg(long, env = "CADHUB_ENV", default_value = "development", global = true)]
    env: String,

    #[command(subcommand)]
    command: Option<Mode>,
}

/// Which components run in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Mode {
    /// HTTP gateway and embedded workers (default)
    Serve,
    /// HTTP gateway only
    Api,
    /// Conversion workers only
    Worker,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mode = cli.command.unwrap_or(Mode::Serve);

    let config = match AppConfig::load(&cli.env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config, mode).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main run function
async fn run(config: AppConfig, mode: Mode) -> Result<(), AppError> {
    tracing::info!(
        "Starting CadHub v{} ({:?} mode)",
        env!("CARGO_PKG_VERSION"),
        mode
    );

    // ── Step 1: Split deployments need a shared broker ───────────
    if mode != Mode::Serve && !config.broker.is_shared() {
        return Err(AppError::configuration(format!(
            "'{:?}' mode requires broker.provider = \"redis\"; the in-memory broker is process-local",
            mode
        )));
    }

    // ── Step 2: Create data directories ──────────────────────────
    let layout = StorageLayout::from_config(&config.storage);
    layout.init().await?;

    // ── Step 3: Connect job store and queue ──────────────────────
    tracing::info!(
        "Initializing broker (provider: {})...",
        config.broker.provider
    );
    let broker = Broker::connect(&config.broker).await?;
    tracing::info!("Broker initialized");

    let metrics = Arc::new(ConversionMetrics::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 4: Start workers ────────────────────────────────────
    let run_workers = match mode {
        Mode::Serve => config.worker.enabled,
        Mode::Worker => true,
        Mode::Api => false,
    };

    let workers = if run_workers {
        Some(
            start_workers(
                &config,
                &broker,
                &layout,
                Arc::clone(&metrics),
                shutdown_rx.clone(),
            )
            .await?,
        )
    } else {
        tracing::info!("Conversion workers disabled");
        None
    };

    // ── Step 5: Serve HTTP or wait for shutdown ──────────────────
    if mode == Mode::Worker {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    } else {
        let app_state = cadhub_api::AppState::new(
            config.clone(),
            broker.clone(),
            layout.clone(),
            Arc::clone(&metrics),
        );
        let app = cadhub_api::build_router(app_state);

        let addr = config.server.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!("CadHub server listening on {}", addr);

        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
            let _ = shutdown_tx.send(true);
        });

        server
            .await
            .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;
    }

    // ── Step 6: Wait for background tasks ────────────────────────
    if let Some(workers) = workers {
        tracing::info!("Waiting for workers to complete...");
        workers.stop(&config).await;
    }

    tracing::info!("CadHub shut down gracefully");
    Ok(())
}

/// Running worker pool and its scheduler
struct Workers {
    runner: JoinHandle<()>,
    scheduler: CronScheduler,
}

impl Workers {
    async fn stop(mut self, config: &AppConfig) {
        // The runner enforces the grace period itself; this only bounds a stuck join.
        let limit = Duration::from_secs(config.worker.shutdown_grace_seconds + 5);
        if tokio::time::timeout(limit, self.runner).await.is_err() {
            tracing::warn!("Worker did not stop in time");
        }
        if let Err(e) = self.scheduler.shutdown().await {
            tracing::warn!("Scheduler shutdown failed: {}", e);
        }
    }
}

/// Build the conversion pipeline and start the runner and maintenance schedule
async fn start_workers(
    config: &AppConfig,
    broker: &Broker,
    layout: &StorageLayout,
    metrics: Arc<ConversionMetrics>,
    cancel: watch::Receiver<bool>,
) -> Result<Workers, AppError> {
    let sweep = WorkspaceSweepJob::new(
        layout.temp_dir(),
        Duration::from_secs(config.worker.stale_workspace_minutes * 60),
    );
    if let Err(e) = sweep.run().await {
        tracing::warn!("Startup workspace sweep failed: {}", e);
    }

    let scheduler = CronScheduler::new().await?;
    scheduler
        .register_workspace_sweep(&config.worker.workspace_sweep_cron, sweep)
        .await?;
    scheduler
        .register_job_purge(
            &config.worker.workspace_sweep_cron,
            ExpiredJobPurge::new(Arc::clone(&broker.store)),
        )
        .await?;
    scheduler.start().await?;

    let dispatcher = Dispatcher::from_config(&config.conversion).with_metrics(metrics);
    let handler = Arc::new(ConversionJobHandler::new(
        Arc::clone(&broker.store),
        dispatcher,
        layout.clone(),
    ));

    let worker_id = format!("worker-{}", std::process::id());
    let runner = WorkerRunner::new(
        Arc::clone(&broker.queue),
        handler,
        config.worker.clone(),
        worker_id,
    );

    let handle = tokio::spawn(async move {
        runner.run(cancel).await;
    });

    tracing::info!(
        concurrency = config.worker.concurrency,
        "Conversion workers started"
    );

    Ok(Workers {
        runner: handle,
        scheduler,
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
