//! Alert Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use alerting::Alert;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Query parameters for alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Only unacknowledged alerts
    #[serde(default)]
    pub pending: bool,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub data: Vec<Alert>,
    pub count: usize,
    pub unacknowledged_count: usize,
}

/// Recently fired alerts, newest first
pub async fn get_alerts(
    State(state): State<SharedState>,
    Query(params): Query<AlertQuery>,
) -> Json<AlertResponse> {
    let alerts = state.alerts.lock().await;
    let unacknowledged_count = alerts.pending().len();
    let mut data = if params.pending {
        alerts.pending()
    } else {
        alerts.recent()
    };
    data.reverse();
    data.truncate(params.limit);

    Json(AlertResponse {
        count: data.len(),
        unacknowledged_count,
        data,
    })
}

pub async fn acknowledge(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    if state.alerts.lock().await.acknowledge(&key) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No alert {}", key)))
    }
}
