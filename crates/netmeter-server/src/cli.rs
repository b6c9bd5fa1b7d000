//! CLI entry point for the netmeter daemon.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use netmeter_backup::ensure_healthy;
use netmeter_config::{
    CliOverrides, LoggingConfig, apply_overrides, load_config, validate_config,
};
use netmeter_report::{JobStore, ReportCache, run_worker};
use netmeter_store::CounterStore;

use crate::collector::{RouterDbSource, RouterSource};
use crate::groups::GroupStore;
use crate::scheduler::{run_backup_loop, run_collection_loop};
use crate::state::AppState;

/// netmeterd CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "netmeterd",
    version,
    about = "Per-device bandwidth accounting and reports for home routers"
)]
pub struct ServerArgs {
    /// Config file path (json/yaml/toml)
    #[arg(short, long, default_value = "netmeter.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: CliOverrides,
}

/// Load config, bring the store up (healing it first if needed), and run
/// the HTTP server plus background loops until a shutdown signal.
pub async fn run(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(&args.config)?;
    apply_overrides(&mut config, &args.overrides);
    validate_config(&config)?;

    init_tracing(&config.logging);

    std::fs::create_dir_all(&config.paths.data_dir)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    let gate = Arc::new(tokio::sync::RwLock::new(()));

    // Heal before the first open: a corrupt file would otherwise wedge the
    // pool. First boot (no file yet) has nothing to heal.
    let db_path = config.paths.database();
    if config.backup.self_heal && db_path.exists() {
        match ensure_healthy(
            &db_path,
            &config.paths.backup_dir(),
            &config.paths.data_dir,
            true,
            &gate,
        )
        .await
        {
            Ok(None) => {}
            Ok(Some(status)) => warn!(source = status.source, "database restored at startup"),
            Err(e) => warn!(error = %e, "startup heal failed, opening as-is"),
        }
    }

    let store = Arc::new(CounterStore::open(&db_path).await?);
    let cache = Arc::new(ReportCache::new(config.paths.report_dir()));
    cache.ensure_dir().await?;
    let groups = Arc::new(GroupStore::load(config.paths.data_dir.join("groups.json")));

    let (jobs, job_rx) = JobStore::new();
    tokio::spawn(run_worker(
        job_rx,
        store.clone(),
        cache.clone(),
        jobs.clone(),
        config.quota,
        config.report,
        gate.clone(),
    ));

    let source: Option<Arc<dyn RouterSource>> = config.collector.router_db.as_ref().map(|path| {
        Arc::new(RouterDbSource::new(
            path.clone(),
            config.collector.sync_window_hours * 3600,
        )) as Arc<dyn RouterSource>
    });
    if source.is_none() {
        warn!("no router database configured, collection disabled");
    }

    let state = AppState {
        config: Arc::new(config),
        store,
        cache,
        jobs,
        groups,
        gate,
    };

    tokio::spawn(run_collection_loop(
        state.clone(),
        source,
        shutdown.clone(),
    ));
    tokio::spawn(run_backup_loop(state.clone(), shutdown.clone()));

    let app = crate::routes::api_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&state.config.server.listen).await?;
    info!(listen = %state.config.server.listen, "report server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    state.store.close().await;
    info!("shutdown complete");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over the configured
/// level when set.
fn init_tracing(config: &LoggingConfig) {
    let fallback = config.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
