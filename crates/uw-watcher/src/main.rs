use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uw_core::WatcherConfig;
use uw_storage::UpgradeStore;
use uw_watcher::{
    server, HttpPlanSource, PrometheusMetrics, SharedCollaborators, SlackWebhook, Supervisor,
    WorkerOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "upgrade-watcher", about = "Alert on new Cosmos SDK upgrade plans")]
struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "config.yaml")]
    config_file: PathBuf,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = WatcherConfig::from_path(&args.config_file)
        .with_context(|| format!("loading {}", args.config_file.display()))?;
    if config.chains.is_empty() {
        warn!(event = "no_chains_configured");
    }

    let store = Arc::new(
        UpgradeStore::open(&config.db_path)
            .with_context(|| format!("opening database {}", config.db_path.display()))?,
    );
    for state in store.list_states().context("reading known upgrades")? {
        info!(
            event = "known_upgrade",
            chain_id = %state.chain_id,
            height = state.last_notified_height
        );
    }

    let metrics = Arc::new(PrometheusMetrics::new());
    let shared = SharedCollaborators {
        plan_source: Arc::new(
            HttpPlanSource::new(config.request_timeout()).context("building http client")?,
        ),
        store,
        alerts: Arc::new(
            SlackWebhook::new(config.slack.webhook.clone(), config.request_timeout())
                .context("building webhook client")?,
        ),
        metrics: metrics.clone(),
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let listener = TcpListener::bind(&config.metrics_addr)
        .await
        .with_context(|| format!("binding metrics listener {}", config.metrics_addr))?;
    let server_task = tokio::spawn(server::serve(listener, metrics, stop_rx.clone()));

    let supervisor = Supervisor::from_config(&config, &shared);
    let mut workers = tokio::spawn(supervisor.run(stop_rx));

    let reports = tokio::select! {
        reports = &mut workers => reports.context("supervisor task failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!(event = "shutdown_requested");
            let _ = stop_tx.send(true);
            workers.await.context("supervisor task failed")?
        }
    };

    let _ = stop_tx.send(true);
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(event = "metrics_server_error", error = %err),
        Err(err) => error!(event = "metrics_server_error", error = %err),
    }

    let failed = reports
        .iter()
        .filter(|report| !matches!(report.outcome, WorkerOutcome::Exited(_)))
        .count();
    info!(event = "watcher_exit", workers = reports.len(), abnormal = failed);
    Ok(())
}

fn init_logging(debug: bool) {
    let level = if debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("UW_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},hyper=warn,reqwest=warn")));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
