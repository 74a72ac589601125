//! Device Routes

use axum::{extract::State, http::StatusCode, Json};
use obd_protocol::{ConnectionState, Device, DEFAULT_WIFI_PORT};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    /// One-line status for display
    pub status: String,
    #[serde(flatten)]
    pub state: ConnectionState,
}

#[derive(Debug, Deserialize)]
pub struct AddWifiRequest {
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_WIFI_PORT
}

/// Known devices and connection state
pub async fn get_devices(State(state): State<SharedState>) -> Json<DevicesResponse> {
    Json(DevicesResponse {
        status: state.manager.status_text().await,
        state: state.manager.state().await,
    })
}

/// Scan every registered radio
pub async fn scan(State(state): State<SharedState>) -> ApiResult<Json<Vec<Device>>> {
    Ok(Json(state.manager.scan().await?))
}

/// Add a WiFi adapter by IP address
pub async fn add_wifi(
    State(state): State<SharedState>,
    Json(request): Json<AddWifiRequest>,
) -> ApiResult<(StatusCode, Json<Device>)> {
    let device = state
        .manager
        .add_wifi_device(&request.ip, request.port)
        .await?;
    Ok((StatusCode::CREATED, Json(device)))
}
