//! Connection Routes

use axum::{extract::State, Json};
use obd_protocol::Device;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub command: String,
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Connect to a known device and start polling it
pub async fn connect(
    State(state): State<SharedState>,
    Json(request): Json<ConnectRequest>,
) -> ApiResult<Json<Device>> {
    state.stop_polling().await;
    let result = state.manager.connect(&request.device_id).await;
    record_connect(&result);
    let device = result?;
    if let Some(client) = state.manager.client().await {
        state.start_polling(client).await;
    }
    Ok(Json(device))
}

pub async fn disconnect(State(state): State<SharedState>) -> Json<StatusResponse> {
    state.stop_polling().await;
    state.manager.disconnect().await;
    info!("Disconnected on request");
    Json(StatusResponse {
        status: state.manager.status_text().await,
    })
}

/// Send one raw command through the session queue
pub async fn command(
    State(state): State<SharedState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let command = request.command.trim().to_uppercase();
    if command.is_empty() {
        return Err(ApiError::BadRequest("command must not be empty".to_string()));
    }
    let response = state.manager.send_command(&command).await;
    let outcome = if response.is_ok() { "ok" } else { "error" };
    metrics::counter!("api_commands_total", "outcome" => outcome).increment(1);
    let response = response?;
    Ok(Json(CommandResponse { command, response }))
}

fn record_connect(result: &obd_protocol::Result<Device>) {
    let outcome = match result {
        Ok(_) => "connected",
        Err(e) if e.is_connection_failure() => "failed",
        Err(_) => "rejected",
    };
    metrics::counter!("api_connect_total", "outcome" => outcome).increment(1);
}
