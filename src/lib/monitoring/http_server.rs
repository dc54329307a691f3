//! HTTP server for exposing monitoring data using Axum

use super::publisher::MetricsPublisher;
use crate::{
    connection::{ConnectionRecord, ConnectionState},
    error::ExporterErrorKind,
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::{
    future::Future,
    net::SocketAddr,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::net::TcpListener;
use tracing::info;
use utoipa::{OpenApi, ToSchema};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "IPsec Exporter API",
        version = "0.1.0",
        description = "HTTP JSON API for the IPsec traffic exporter"
    ),
    paths(handle_health, handle_connections, handle_connection_by_name),
    components(schemas(
        ConnectionRecord,
        ConnectionState,
        HealthResponse,
        ErrorResponse,
        ConnectionsResponse,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "connections", description = "Latest IPsec connection snapshot")
    )
)]
struct ApiDoc;

/// Shared state for all HTTP handlers
#[derive(Clone)]
struct ServerState {
    publisher: MetricsPublisher,
    start_time: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// HTTP server exposing `/metrics` and the JSON API.
pub struct MonitoringServer {
    listener: TcpListener,
    bind_address: SocketAddr,
    state: ServerState,
}

impl MonitoringServer {
    /// Binds the listener.
    ///
    /// Binding happens up front so that an unusable address is reported as a
    /// startup failure rather than from inside a background task.
    pub async fn bind(
        bind_address: SocketAddr,
        publisher: MetricsPublisher,
    ) -> Result<Self, ExporterErrorKind> {
        let listener = TcpListener::bind(bind_address)
            .await
            .map_err(|source| ExporterErrorKind::Bind {
                address: bind_address,
                source,
            })?;
        let bind_address = listener.local_addr().unwrap_or(bind_address);

        Ok(Self {
            listener,
            bind_address,
            state: ServerState {
                publisher,
                start_time: unix_now(),
            },
        })
    }

    /// Address the server is actually listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.bind_address
    }

    /// Serve requests until `shutdown_signal` completes.
    pub async fn run(
        self,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ExporterErrorKind> {
        info!("Starting monitoring server on http://{}", self.bind_address);
        info!(
            "Prometheus metrics available at http://{}/metrics",
            self.bind_address
        );

        let app = router(self.state);

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal.await;
                info!("Monitoring server received shutdown signal, stopping...");
            })
            .await
            .map_err(ExporterErrorKind::MonitoringServer)?;

        info!("Monitoring server stopped");
        Ok(())
    }
}

fn router(state: ServerState) -> Router {
    let api_v1 = Router::new()
        .route("/health", get(handle_health))
        .route("/connections", get(handle_connections))
        .route("/connections/{name}", get(handle_connection_by_name));

    Router::new()
        .route("/", get(handle_root))
        .route("/api-docs/openapi.json", get(handle_openapi))
        .nest("/api/v1", api_v1)
        .route("/metrics", get(handle_prometheus_metrics))
        .with_state(state)
}

#[derive(serde::Serialize, ToSchema)]
struct HealthResponse {
    /// "ok", "stale" or "unhealthy"
    status: String,
    /// Whether the latest status poll succeeded
    up: bool,
    connections: usize,
    established: usize,
    last_success_age_secs: Option<u64>,
    last_error: Option<String>,
    uptime_secs: u64,
}

#[derive(serde::Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
}

#[derive(serde::Serialize, ToSchema)]
struct ConnectionsResponse {
    total: usize,
    items: Vec<ConnectionRecord>,
}

fn not_found(error: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Root endpoint - lists all available APIs
async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "IPsec Exporter",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/": "This endpoint - API listing",
            "/api-docs/openapi.json": "OpenAPI specification",
            "/api/v1/health": "Health check",
            "/api/v1/connections": "Connections of the latest snapshot",
            "/api/v1/connections/{name}": "Single connection of the latest snapshot",
            "/metrics": "Prometheus metrics"
        }
    }))
}

async fn handle_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Exporter health", body = HealthResponse)
    )
)]
async fn handle_health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let cache = state.publisher.cache();
    let snapshot = cache.get_snapshot();

    let status = if !snapshot.is_up() {
        "unhealthy"
    } else if snapshot.is_stale(cache.stale_after()) {
        "stale"
    } else {
        "ok"
    };
    let (connections, established) = snapshot
        .connections
        .as_deref()
        .map(|c| (c.len(), c.established_count()))
        .unwrap_or_default();

    Json(HealthResponse {
        status: status.to_string(),
        up: snapshot.is_up(),
        connections,
        established,
        last_success_age_secs: snapshot.age().map(|age| age.as_secs()),
        last_error: snapshot.last_error,
        uptime_secs: unix_now().saturating_sub(state.start_time),
    })
}

/// Get every connection of the latest snapshot
#[utoipa::path(
    get,
    path = "/api/v1/connections",
    tag = "connections",
    responses(
        (status = 200, description = "Connections of the latest snapshot", body = ConnectionsResponse),
        (status = 404, description = "No snapshot published yet", body = ErrorResponse)
    )
)]
async fn handle_connections(State(state): State<ServerState>) -> Response {
    match state.publisher.cache().get_snapshot().connections {
        Some(connections) => {
            let items: Vec<ConnectionRecord> = connections.iter().cloned().collect();
            Json(ConnectionsResponse {
                total: items.len(),
                items,
            })
            .into_response()
        }
        None => not_found("No IPsec snapshot published yet"),
    }
}

/// Get a single connection by name
#[utoipa::path(
    get,
    path = "/api/v1/connections/{name}",
    tag = "connections",
    params(
        ("name" = String, Path, description = "Connection name")
    ),
    responses(
        (status = 200, description = "Connection record", body = ConnectionRecord),
        (status = 404, description = "Connection not found", body = ErrorResponse)
    )
)]
async fn handle_connection_by_name(
    Path(name): Path<String>,
    State(state): State<ServerState>,
) -> Response {
    let snapshot = state.publisher.cache().get_snapshot();

    let connections = match snapshot.connections {
        Some(ref connections) => connections,
        None => return not_found("No IPsec snapshot published yet"),
    };

    match connections.get(&name) {
        Some(connection) => Json(connection.clone()).into_response(),
        None => not_found(format!("Connection {name} not found")),
    }
}

/// Handler for Prometheus metrics endpoint
async fn handle_prometheus_metrics(State(state): State<ServerState>) -> Response {
    match state.publisher.metrics().encode() {
        Ok(metrics_text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            metrics_text,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Encoding error: {}", e),
            }),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connection::ConnectionSnapshot, error::CommandError};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_router() -> (Router, MetricsPublisher) {
        let publisher = MetricsPublisher::new(Duration::from_secs(15)).unwrap();
        let state = ServerState {
            publisher: publisher.clone(),
            start_time: unix_now(),
        };
        (router(state), publisher)
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn sample() -> ConnectionSnapshot {
        let mut record = ConnectionRecord::new("net-a");
        record.status = 1;
        record.state = ConnectionState::Established;
        record.bytes_in = 500;
        [record, ConnectionRecord::new("net-b")]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (router, publisher) = test_router();
        publisher.publish(sample()).unwrap();

        let (status, body) = get(router, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(
            r#"ipsec_connection_status{connection="net-a",name="net-a",state="established"} 1"#
        ));
        assert!(body.contains("ipsec_exporter_up 1"));
    }

    #[tokio::test]
    async fn test_connections_before_first_publish() {
        let (router, _publisher) = test_router();
        let (status, body) = get(router, "/api/v1/connections").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("No IPsec snapshot published yet"));
    }

    #[tokio::test]
    async fn test_connections_listing() {
        let (router, publisher) = test_router();
        publisher.publish(sample()).unwrap();

        let (status, body) = get(router, "/api/v1/connections").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["total"], 2);
        assert_eq!(json["items"][0]["name"], "net-a");
        assert_eq!(json["items"][0]["state"], "established");
        assert_eq!(json["items"][0]["bytes_in"], 500);
        assert_eq!(json["items"][1]["left_subnet"], "unknown");
    }

    #[tokio::test]
    async fn test_connection_by_name() {
        let (router, publisher) = test_router();
        publisher.publish(sample()).unwrap();

        let (status, body) = get(router.clone(), "/api/v1/connections/net-b").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["name"], "net-b");
        assert_eq!(json["status"], 0);

        let (status, body) = get(router, "/api/v1/connections/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Connection missing not found"));
    }

    #[tokio::test]
    async fn test_health_reports_failures() {
        let (router, publisher) = test_router();

        let (_, body) = get(router.clone(), "/api/v1/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["up"], false);

        publisher.publish(sample()).unwrap();
        let (_, body) = get(router.clone(), "/api/v1/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 2);
        assert_eq!(json["established"], 1);

        publisher.report_failure(&CommandError::EmptyCommand);
        let (_, body) = get(router, "/api/v1/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["last_error"], "status command is empty");
        assert_eq!(json["connections"], 2);
    }

    #[tokio::test]
    async fn test_root_and_openapi() {
        let (router, _publisher) = test_router();

        let (status, body) = get(router.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/metrics"));

        let (status, body) = get(router, "/api-docs/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/api/v1/connections/{name}"));
    }
}
