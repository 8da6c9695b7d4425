//! HTTP surface for the OpenLDAP Prometheus exporter.
//!
//! Serves `GET /metrics` (the current registry snapshot in the Prometheus
//! text format) and `GET /version`. Runs for the process lifetime on its own
//! task, independent of the scrape loop; the two share only the metric set.

#![deny(missing_docs)]

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use ldap_exporter_core::metrics::LdapMetrics;
use ldap_exporter_core::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    metrics: Arc<LdapMetrics>,
    version: String,
}

impl AppState {
    /// Creates the handler state from the shared metric set and the one-line
    /// version string served by `/version`.
    #[must_use]
    pub fn new(metrics: Arc<LdapMetrics>, version: impl Into<String>) -> Self {
        Self {
            metrics,
            version: version.into(),
        }
    }
}

/// Listen address and optional TLS material for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    addr: SocketAddr,
    tls: Option<(PathBuf, PathBuf)>,
}

impl MetricsServerConfig {
    /// Creates a plain-HTTP server configuration.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, tls: None }
    }

    /// Enables HTTPS when both a certificate chain and key file are given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when only one of the two paths is set.
    pub fn with_tls_files(
        mut self,
        cert_file: Option<PathBuf>,
        key_file: Option<PathBuf>,
    ) -> Result<Self> {
        self.tls = match (cert_file, key_file) {
            (Some(cert), Some(key)) => Some((cert, key)),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "metrics server certificate and key must be given together".to_string(),
                ))
            }
        };
        Ok(self)
    }
}

/// Creates the router with all routes. Non-GET methods on the registered
/// paths answer 405.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/version", get(version_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Serves the metrics endpoint until the process exits.
///
/// # Errors
///
/// Returns [`Error::Server`] when binding fails or the listener dies, and
/// [`Error::Server`] when the TLS material cannot be loaded.
pub async fn serve(config: MetricsServerConfig, state: AppState) -> Result<()> {
    let app = router(state);
    match config.tls {
        Some((cert_file, key_file)) => {
            let tls = RustlsConfig::from_pem_file(&cert_file, &key_file)
                .await
                .map_err(|err| {
                    Error::Server(format!("failed to load metrics server certificate: {err}"))
                })?;
            axum_server::bind_rustls(config.addr, tls)
                .serve(app.into_make_service())
                .await
                .map_err(|err| Error::Server(err.to_string()))
        }
        None => {
            let listener = tokio::net::TcpListener::bind(config.addr)
                .await
                .map_err(|err| Error::Server(format!("failed to bind {}: {err}", config.addr)))?;
            axum::serve(listener, app)
                .await
                .map_err(|err| Error::Server(err.to_string()))
        }
    }
}

/// Metrics endpoint: the current sink snapshot in the text exposition format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// Version endpoint: a single plain-text line.
async fn version_handler(State(state): State<Arc<AppState>>) -> String {
    format!("{}\n", state.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> (AppState, Arc<LdapMetrics>) {
        let metrics = Arc::new(LdapMetrics::new().unwrap());
        let state = AppState::new(Arc::clone(&metrics), "ldap-exporter v0.1.0");
        (state, metrics)
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_registered_series() {
        let (state, metrics) = test_state();
        metrics
            .posix_account_count()
            .with_label_values(&["ou=People,dc=example,dc=com"])
            .set(5.0);
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/plain"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("ldap_posix_account_count"));
        assert!(body.contains("ou=People,dc=example,dc=com"));
    }

    #[tokio::test]
    async fn version_endpoint_returns_single_line() {
        let (state, _metrics) = test_state();
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/version")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&bytes), "ldap-exporter v0.1.0\n");
    }

    #[tokio::test]
    async fn version_endpoint_rejects_non_get() {
        let (state, _metrics) = test_state();
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/version")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn tls_files_must_be_paired() {
        let addr: SocketAddr = "127.0.0.1:9330".parse().unwrap();
        let config = MetricsServerConfig::new(addr)
            .with_tls_files(Some(PathBuf::from("/tls/cert.pem")), None);
        assert!(config.is_err());

        let config = MetricsServerConfig::new(addr)
            .with_tls_files(
                Some(PathBuf::from("/tls/cert.pem")),
                Some(PathBuf::from("/tls/key.pem")),
            )
            .unwrap();
        assert!(config.tls.is_some());
    }
}
