//! Prometheus scrape endpoint
//!
//! Serves `GET /metrics` for the lifetime of the process. The server runs on
//! its own task next to the workflow; a bind failure is logged and the run
//! continues without it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use zerocert_common::CertMetrics;

/// Router exposing `/metrics`
pub fn router(metrics: Arc<CertMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<CertMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, metrics.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve metrics on an already bound listener
pub async fn serve(listener: TcpListener, metrics: Arc<CertMetrics>) -> std::io::Result<()> {
    axum::serve(listener, router(metrics)).await
}

/// Start the metrics server on `0.0.0.0:port` in the background
pub fn spawn(port: u16, metrics: Arc<CertMetrics>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(address = %addr, error = %e, "Failed to start metrics server");
                return;
            }
        };

        info!(address = %addr, "Metrics server listening");
        if let Err(e) = serve(listener, metrics).await {
            error!(error = %e, "Metrics server stopped");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(CertMetrics::new().unwrap());
        metrics.inc_issued();
        metrics.inc_api_errors();
        metrics.inc_api_errors();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, metrics.clone()));

        let response = reqwest::get(format!("http://{}/metrics", addr))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let body = response.text().await.unwrap();
        assert!(body.contains("certs_issued_total 1"));
        assert!(body.contains("certs_renewed_total 0"));
        assert!(body.contains("api_errors_total 2"));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let metrics = Arc::new(CertMetrics::new().unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, metrics));

        let response = reqwest::get(format!("http://{}/other", addr)).await.unwrap();
        assert_eq!(response.status(), 404);
    }
}
