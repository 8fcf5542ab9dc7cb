use crate::telemetry::PrometheusMetrics;
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub fn router(metrics: Arc<PrometheusMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(|| async { "ok" }))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<Arc<PrometheusMetrics>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], metrics.render())
}

/// Serves `/metrics` and `/health` until `shutdown` turns `true` or its sender is dropped.
pub async fn serve(
    listener: TcpListener,
    metrics: Arc<PrometheusMetrics>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(event = "metrics_server_start", addr = %addr);
    }

    let shutdown = async move {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    };

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(shutdown)
        .await
}
