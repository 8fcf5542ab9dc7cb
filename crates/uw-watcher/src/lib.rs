pub mod alert;
pub mod chain_watcher;
pub mod plan_source;
pub mod server;
pub mod store;
pub mod supervisor;
pub mod telemetry;

pub use alert::{AlertError, AlertSink, SlackWebhook};
pub use chain_watcher::{ChainWatcher, CycleOutcome, WatcherExit, WatcherRunContext, WatcherState};
pub use plan_source::{HttpPlanSource, PlanSource, PlanSourceError};
pub use store::StateStore;
pub use supervisor::{SharedCollaborators, Supervisor, WorkerOutcome, WorkerReport};
pub use telemetry::{MetricsSink, PrometheusMetrics};
