//! Metrics and health HTTP endpoint.

use std::sync::LazyLock;

use axum::{Router, http::HeaderValue, response::IntoResponse, routing::get};
use prometheus::{IntGauge, IntGaugeVec, register_int_gauge, register_int_gauge_vec};
use rean_metrics::gather_default_metrics;
use tracing::{error, warn};

static LEAN_NODE_INFO: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec!(
        "lean_node_info",
        "Node information (always 1)",
        &["name", "version"]
    )
    .unwrap()
});

static LEAN_NODE_START_TIME_SECONDS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("lean_node_start_time_seconds", "Timestamp when node started").unwrap()
});

static LEAN_VALIDATORS_COUNT: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "lean_validators_count",
        "Number of validators managed by this node"
    )
    .unwrap()
});

pub fn set_node_info(name: &str, version: &str) {
    LEAN_NODE_INFO.with_label_values(&[name, version]).set(1);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_secs();
    LEAN_NODE_START_TIME_SECONDS.set(now as i64);
}

pub fn update_validators_count(count: u64) {
    LEAN_VALIDATORS_COUNT.set(count.try_into().unwrap_or(i64::MAX));
}

/// Serve `/metrics` and `/lean/v0/health` on the given port.
pub fn serve_metrics(port: u16) {
    let app = Router::new()
        .route("/metrics", get(get_metrics))
        .route("/lean/v0/health", get(get_health));

    tokio::spawn(async move {
        let address = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(address).await {
            Ok(listener) => {
                if let Err(err) = axum::serve(listener, app).await {
                    error!(%err, "Metrics server failed");
                }
            }
            Err(err) => error!(%err, port, "Failed to bind metrics endpoint"),
        }
    });
}

async fn get_health() -> impl IntoResponse {
    r#"{"status": "healthy", "service": "rean"}"#
}

async fn get_metrics() -> impl IntoResponse {
    let mut response = gather_default_metrics()
        .inspect_err(|err| {
            warn!(%err, "Failed to gather Prometheus metrics");
        })
        .unwrap_or_default()
        .into_response();
    let content_type = HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8");
    response.headers_mut().insert("content-type", content_type);
    response
}
