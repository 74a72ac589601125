//! ELM327 Dashboard API Server
//!
//! REST API over the adapter connection, the poll loop and the alerts.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use obd_link::{BleRadio, SerialRadio, TcpRadio, WebSocketRadio};
use obd_protocol::mock::MockAdapter;
use obd_protocol::ConnectionManager;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod error;
mod routes;
pub mod state;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use state::{AppState, SharedState};

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub connection: String,
    pub polling: bool,
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/devices", get(routes::devices::get_devices))
        .route("/api/v1/devices/scan", post(routes::devices::scan))
        .route("/api/v1/devices/wifi", post(routes::devices::add_wifi))
        .route("/api/v1/connect", post(routes::connection::connect))
        .route("/api/v1/disconnect", post(routes::connection::disconnect))
        .route("/api/v1/command", post(routes::connection::command))
        .route("/api/v1/data", get(routes::data::get_data))
        .route("/api/v1/history", get(routes::data::get_history))
        .route("/api/v1/alerts", get(routes::alerts::get_alerts))
        .route("/api/v1/alerts/:key/ack", post(routes::alerts::acknowledge))
        .route("/api/v1/diagnostics", post(routes::diagnostics::run))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: obd_protocol::now_ms() / 1000,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connection: state.manager.status_text().await,
        polling: state.poller().await.is_some(),
    })
}

async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}

/// Initialize logging
pub fn init_logging(
    config: &config::LoggingConfig,
) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}

/// Connection manager with every radio the config enables
pub async fn build_manager(config: &AppConfig) -> ConnectionManager {
    let link = &config.link;
    let mut manager = ConnectionManager::new(config.session.client_config())
        .with_wifi_kind(link.wifi_kind)
        .with_radio(Arc::new(SerialRadio::new(link.baud_rate)))
        .with_radio(Arc::new(TcpRadio))
        .with_radio(Arc::new(WebSocketRadio::with_framing(link.websocket_framing)));

    if link.demo {
        manager = manager.with_radio(Arc::new(MockAdapter::new()));
    }
    if link.ble {
        match BleRadio::first_adapter().await {
            Ok(radio) => manager = manager.with_radio(Arc::new(radio)),
            Err(e) => warn!("Bluetooth LE unavailable: {}", e),
        }
    }
    manager
}

async fn auto_connect(state: &AppState, device_id: &str) {
    if let Err(e) = state.manager.scan().await {
        warn!("Startup scan failed: {}", e);
    }
    match state.manager.connect(device_id).await {
        Ok(device) => {
            info!("Auto-connected to {}", device.name);
            if let Some(client) = state.manager.client().await {
                state.start_polling(client).await;
            }
        }
        Err(e) => warn!("Auto-connect to {} failed: {}", device_id, e),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Run the server until Ctrl-C
pub async fn run_server(config: AppConfig) -> std::io::Result<()> {
    let manager = build_manager(&config).await;
    let addr = config.server.addr.clone();
    let auto = config.link.auto_connect.clone();

    let mut app_state = AppState::new(manager, config);
    if app_state.config.server.prometheus {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => app_state = app_state.with_metrics(handle),
            Err(e) => warn!("Prometheus exporter not installed: {}", e),
        }
    }
    let state: SharedState = Arc::new(app_state);

    if let Some(device_id) = auto {
        auto_connect(&state, &device_id).await;
    }

    let app = create_router(state.clone());
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.stop_polling().await;
    state.manager.disconnect().await;
    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use obd_protocol::mock::MOCK_ADDRESS;
    use obd_protocol::{ClientConfig, InitSequence};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let client = ClientConfig {
            init: InitSequence::minimal(),
            ..Default::default()
        };
        let manager = ConnectionManager::new(client).with_radio(Arc::new(MockAdapter::new()));
        Arc::new(AppState::new(manager, AppConfig::default()))
    }

    async fn call(state: &SharedState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn connect(state: &SharedState) {
        call(state, "POST", "/api/v1/devices/scan", None).await;
        let (status, _) = call(
            state,
            "POST",
            "/api/v1/connect",
            Some(json!({ "device_id": MOCK_ADDRESS })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connection"], "Disconnected");
        assert_eq!(body["polling"], false);
    }

    #[tokio::test]
    async fn test_command_requires_connection() {
        let state = test_state();
        let (status, body) = call(
            &state,
            "POST",
            "/api/v1/command",
            Some(json!({ "command": "010C" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Not connected to an adapter");
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let state = test_state();
        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/connect",
            Some(json!({ "device_id": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_add_wifi_device() {
        let state = test_state();
        let (status, body) = call(
            &state,
            "POST",
            "/api/v1/devices/wifi",
            Some(json!({ "ip": "192.168.0.10" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], "wifi-192.168.0.10:35000");

        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/devices/wifi",
            Some(json!({ "ip": "192.168.0" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = call(&state, "GET", "/api/v1/devices", None).await;
        assert_eq!(body["devices"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_command_and_data() {
        let state = test_state();
        connect(&state).await;

        let (status, body) = call(
            &state,
            "POST",
            "/api/v1/command",
            Some(json!({ "command": "atrv" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["command"], "ATRV");
        assert_eq!(body["response"], "12.5V");

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let (status, body) = call(&state, "GET", "/api/v1/data", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], true);
        assert_eq!(body["polling"], true);
        assert_eq!(body["snapshot"]["readings"].as_array().map(Vec::len), Some(9));
        assert!(body["statuses"]["battery_voltage"].is_string());

        let (_, body) = call(&state, "GET", "/api/v1/history?metric=rpm", None).await;
        assert!(!body["rpm"].as_array().unwrap().is_empty());

        let (status, body) = call(&state, "POST", "/api/v1/disconnect", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Disconnected");
        assert!(state.poller().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_history_metric() {
        let state = test_state();
        let (status, _) = call(&state, "GET", "/api/v1/history?metric=oil", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&state, "GET", "/api/v1/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_alerts_and_acknowledge() {
        let state = test_state();
        state.alerts.lock().await.evaluate("coolant_temp", 110.0, 1);

        let (_, body) = call(&state, "GET", "/api/v1/alerts?pending=true", None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["key"], "coolant_temp-danger");

        let (status, _) = call(&state, "POST", "/api/v1/alerts/coolant_temp-danger/ack", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = call(&state, "GET", "/api/v1/alerts", None).await;
        assert_eq!(body["unacknowledged_count"], 0);

        let (status, _) = call(&state, "POST", "/api/v1/alerts/missing/ack", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_diagnostics() {
        let state = test_state();
        let (status, _) = call(&state, "POST", "/api/v1/diagnostics", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        connect(&state).await;
        let (status, body) = call(
            &state,
            "POST",
            "/api/v1/diagnostics?stability_samples=3",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 4);
        assert_eq!(body["passed"], 4);
    }

    #[tokio::test]
    async fn test_metrics_disabled_without_recorder() {
        let state = test_state();
        let (status, _) = call(&state, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
