use crate::alert::AlertSink;
use crate::chain_watcher::{ChainWatcher, WatcherExit, WatcherRunContext};
use crate::plan_source::PlanSource;
use crate::store::StateStore;
use crate::telemetry::MetricsSink;
use futures_util::future::join_all;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use uw_core::WatcherConfig;

/// Collaborators handed to every watcher.
#[derive(Clone)]
pub struct SharedCollaborators {
    pub plan_source: Arc<dyn PlanSource>,
    pub store: Arc<dyn StateStore>,
    pub alerts: Arc<dyn AlertSink>,
    pub metrics: Arc<dyn MetricsSink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Exited(WatcherExit),
    Panicked(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub chain_id: String,
    pub outcome: WorkerOutcome,
}

/// Runs one watcher task per chain. A worker that stops or panics never takes its
/// siblings down with it.
#[derive(Default)]
pub struct Supervisor {
    watchers: Vec<ChainWatcher>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &WatcherConfig, shared: &SharedCollaborators) -> Self {
        let mut supervisor = Self::new();
        for (chain_id, chain) in &config.chains {
            supervisor.add(ChainWatcher::new(WatcherRunContext {
                chain_id: chain_id.clone(),
                endpoint: chain.endpoint.clone(),
                poll_interval: config.poll_interval(),
                plan_source: shared.plan_source.clone(),
                store: shared.store.clone(),
                alerts: shared.alerts.clone(),
                metrics: shared.metrics.clone(),
            }));
        }
        supervisor
    }

    pub fn add(&mut self, watcher: ChainWatcher) {
        self.watchers.push(watcher);
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Spawns every watcher and waits until all of them have ended.
    pub async fn run(self, stop: watch::Receiver<bool>) -> Vec<WorkerReport> {
        info!(event = "supervisor_start", workers = self.watchers.len());

        let workers = self.watchers.into_iter().map(|watcher| {
            let chain_id = watcher.chain_id().to_string();
            let handle = tokio::spawn(watcher.run(stop.clone()));
            async move {
                let outcome = match handle.await {
                    Ok(exit) => {
                        info!(event = "worker_exit", chain_id = %chain_id, exit = ?exit);
                        WorkerOutcome::Exited(exit)
                    }
                    Err(err) if err.is_panic() => {
                        let message = panic_message(err.into_panic());
                        error!(event = "worker_panic", chain_id = %chain_id, panic = %message);
                        WorkerOutcome::Panicked(message)
                    }
                    Err(err) => {
                        error!(event = "worker_cancelled", chain_id = %chain_id, error = %err);
                        WorkerOutcome::Cancelled
                    }
                };
                WorkerReport { chain_id, outcome }
            }
        });

        let reports = join_all(workers.collect::<Vec<_>>()).await;
        info!(event = "supervisor_stop", workers = reports.len());
        reports
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
