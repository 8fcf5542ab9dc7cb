//! Per-chain upgrade watcher.
//!
//! A watcher sleeps for its poll interval, fetches the node's current upgrade plan and
//! compares the plan height with the last height recorded for the chain. A higher
//! height is announced through the alert sink and then written to the store. A fetch
//! error ends the watcher for good; the stalled `last_checked` gauge is how an operator
//! notices.

use crate::alert::AlertSink;
use crate::plan_source::PlanSource;
use crate::store::StateStore;
use crate::telemetry::MetricsSink;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn};
use uw_core::{UpgradePlan, WatchErrorKind};
use uw_storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Polling,
    Deciding,
    Idle,
    Notifying,
    Stopped,
}

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NoPlan,
    AlreadyNotified {
        height: u64,
        last_notified_height: u64,
    },
    /// The stored height could not be read; nothing was sent.
    StateUnavailable,
    Notified {
        height: u64,
        delivered: bool,
        persisted: bool,
    },
    Terminated(WatchErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherExit {
    Shutdown,
    Terminated(WatchErrorKind),
}

/// Everything one chain's worker needs. The collaborators may be shared between
/// workers; the context itself is not.
#[derive(Clone)]
pub struct WatcherRunContext {
    pub chain_id: String,
    pub endpoint: String,
    pub poll_interval: Duration,
    pub plan_source: Arc<dyn PlanSource>,
    pub store: Arc<dyn StateStore>,
    pub alerts: Arc<dyn AlertSink>,
    pub metrics: Arc<dyn MetricsSink>,
}

pub struct ChainWatcher {
    ctx: WatcherRunContext,
    state: WatcherState,
    terminated: Option<WatchErrorKind>,
}

impl ChainWatcher {
    pub fn new(ctx: WatcherRunContext) -> Self {
        Self {
            ctx,
            state: WatcherState::Idle,
            terminated: None,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.ctx.chain_id
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Runs one fetch / decide / notify pass. Once a fetch has failed the watcher stays
    /// `Stopped` and every later call returns the same `Terminated` outcome without
    /// touching the node.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if let Some(kind) = self.terminated {
            warn!(event = "cycle_after_stop", chain_id = %self.ctx.chain_id, error_kind = %kind);
            return CycleOutcome::Terminated(kind);
        }

        self.state = WatcherState::Polling;
        let chain_id = self.ctx.chain_id.as_str();
        debug!(event = "plan_fetch_start", chain_id = %chain_id);

        let plan = match self.ctx.plan_source.fetch_plan(&self.ctx.endpoint).await {
            Ok(plan) => plan,
            Err(err) => {
                let kind = err.kind();
                error!(
                    event = "plan_fetch_failed",
                    chain_id = %chain_id,
                    error_kind = %kind,
                    error = %err
                );
                self.ctx.metrics.increment_error(chain_id, kind);
                self.state = WatcherState::Stopped;
                self.terminated = Some(kind);
                return CycleOutcome::Terminated(kind);
            }
        };
        self.ctx.metrics.record_check(chain_id, Utc::now());

        self.state = WatcherState::Deciding;
        let Some(plan) = plan else {
            debug!(event = "no_upgrade_plan", chain_id = %chain_id);
            self.state = WatcherState::Idle;
            return CycleOutcome::NoPlan;
        };

        let read = {
            let chain_id = chain_id.to_string();
            on_store(&self.ctx.store, move |store| store.get_state(&chain_id)).await
        };
        match read {
            Ok(Some(known)) if known.last_notified_height >= plan.height => {
                debug!(
                    event = "upgrade_already_notified",
                    chain_id = %chain_id,
                    height = plan.height,
                    last_notified_height = known.last_notified_height
                );
                self.state = WatcherState::Idle;
                return CycleOutcome::AlreadyNotified {
                    height: plan.height,
                    last_notified_height: known.last_notified_height,
                };
            }
            Ok(_) => {}
            Err(err) => {
                error!(event = "state_read_failed", chain_id = %chain_id, error = %err);
                self.ctx
                    .metrics
                    .increment_error(chain_id, WatchErrorKind::DatabaseReadFailed);
                self.state = WatcherState::Idle;
                return CycleOutcome::StateUnavailable;
            }
        }

        self.state = WatcherState::Notifying;
        let (delivered, persisted) = notify_and_persist(&self.ctx, &plan).await;
        self.state = WatcherState::Idle;
        CycleOutcome::Notified {
            height: plan.height,
            delivered,
            persisted,
        }
    }

    /// Polls until a fetch fails or `stop` is set to `true`.
    #[instrument(name = "chain_watcher", skip_all, fields(chain_id = %self.ctx.chain_id))]
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> WatcherExit {
        info!(
            event = "watcher_start",
            endpoint = %self.ctx.endpoint,
            poll_interval_ms = self.ctx.poll_interval.as_millis() as u64
        );
        let mut stop_open = true;

        loop {
            if *stop.borrow() {
                break;
            }

            let sleep = tokio::time::sleep(self.ctx.poll_interval);
            tokio::pin!(sleep);
            let mut stopping = false;
            while !stopping {
                tokio::select! {
                    () = &mut sleep => break,
                    changed = stop.changed(), if stop_open => match changed {
                        Ok(()) => stopping = *stop.borrow(),
                        // Sender gone: nobody can stop us any more.
                        Err(_) => stop_open = false,
                    },
                }
            }
            if stopping {
                break;
            }

            if let CycleOutcome::Terminated(kind) = self.run_cycle().await {
                warn!(event = "watcher_terminated", error_kind = %kind);
                return WatcherExit::Terminated(kind);
            }
        }

        info!(event = "watcher_stop");
        WatcherExit::Shutdown
    }
}

#[derive(Debug, Error)]
enum StoreCallError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("store task failed: {0}")]
    Join(#[from] JoinError),
}

/// Runs a store call on the blocking pool; SQLite may wait on its busy timeout.
async fn on_store<T, F>(store: &Arc<dyn StateStore>, call: F) -> Result<T, StoreCallError>
where
    T: Send + 'static,
    F: FnOnce(&dyn StateStore) -> Result<T, StorageError> + Send + 'static,
{
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || call(&*store)).await??)
}

/// Sends the alert, then records the height whether or not delivery worked. Returns
/// `(delivered, persisted)`.
async fn notify_and_persist(ctx: &WatcherRunContext, plan: &UpgradePlan) -> (bool, bool) {
    let chain_id = ctx.chain_id.as_str();
    info!(
        event = "upgrade_detected",
        chain_id = %chain_id,
        plan_name = %plan.name,
        height = plan.height
    );

    let delivered = match ctx.alerts.notify(chain_id, plan).await {
        Ok(()) => true,
        Err(err) => {
            error!(event = "notification_failed", chain_id = %chain_id, error = %err);
            ctx.metrics
                .increment_error(chain_id, WatchErrorKind::NotificationFailed);
            false
        }
    };

    let write = {
        let chain_id = chain_id.to_string();
        let height = plan.height;
        on_store(&ctx.store, move |store| store.upsert_state(&chain_id, height)).await
    };
    let persisted = match write {
        Ok(()) => true,
        Err(err) => {
            // The row is unchanged, so the next poll will announce this plan again.
            error!(
                event = "state_update_failed",
                chain_id = %chain_id,
                height = plan.height,
                error = %err
            );
            ctx.metrics
                .increment_error(chain_id, WatchErrorKind::DatabaseUpdateFailed);
            false
        }
    };

    (delivered, persisted)
}
