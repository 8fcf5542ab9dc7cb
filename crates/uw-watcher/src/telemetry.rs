use chrono::{DateTime, Utc};
use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use uw_core::WatchErrorKind;

pub const LAST_CHECKED: &str = "last_checked";
pub const ERRORS: &str = "errors";

/// Liveness and error signals emitted by the watchers.
pub trait MetricsSink: Send + Sync {
    fn record_check(&self, chain_id: &str, at: DateTime<Utc>);
    fn increment_error(&self, chain_id: &str, kind: WatchErrorKind);
}

/// Prometheus-backed sink. Owns its recorder instead of installing a global one, so
/// every consumer has to be handed this value explicitly.
pub struct PrometheusMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        recorder.describe_gauge(
            KeyName::from_const_str(LAST_CHECKED),
            None,
            SharedString::const_str("Last time an upgrade plan was fetched successfully"),
        );
        recorder.describe_counter(
            KeyName::from_const_str(ERRORS),
            None,
            SharedString::const_str("Errors encountered while watching for upgrades"),
        );
        Self { recorder, handle }
    }

    /// Prometheus text exposition of every registered series.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

impl MetricsSink for PrometheusMetrics {
    fn record_check(&self, chain_id: &str, at: DateTime<Utc>) {
        let key = Key::from_parts(LAST_CHECKED, vec![Label::new("chain_id", chain_id.to_string())]);
        let seconds = at.timestamp_millis() as f64 / 1000.0;
        self.recorder.register_gauge(&key, &metadata()).set(seconds);
    }

    fn increment_error(&self, chain_id: &str, kind: WatchErrorKind) {
        let key = Key::from_parts(
            ERRORS,
            vec![
                Label::new("chain_id", chain_id.to_string()),
                Label::new("error", kind.as_str()),
            ],
        );
        self.recorder.register_counter(&key, &metadata()).increment(1);
    }
}
