//! Prometheus exposition over HTTP.
//!
//! The recorder is installed globally; the HTTP side serves the rendered
//! scrape text at `/metrics` and a liveness probe at `/health`.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::error;

use crate::error::{MetricsError, PrometheusInitSnafu};

/// Install the global Prometheus recorder and start serving it on `addr`.
///
/// Fails if a recorder is already installed, so call it once per process,
/// before any worker emits an event. The server itself runs detached; a
/// bind failure is logged but does not take the kitchen down.
pub fn init(addr: SocketAddr) -> Result<(), MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    tokio::spawn(serve(addr, handle));
    Ok(())
}

async fn serve(addr: SocketAddr, handle: PrometheusHandle) {
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(|| async { "ok\n" }))
        .layer(Extension(handle));

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("metrics endpoint could not bind {addr}: {e}");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("metrics endpoint stopped serving: {e}");
    }
}

async fn render_metrics(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}
