//! Diagnostics Routes

use axum::{
    extract::{Query, State},
    Json,
};
use obd_protocol::ObdError;
use obd_scheduler::{DiagnosticsConfig, DiagnosticsReport, SelfTest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct DiagnosticsQuery {
    /// RPM requests in the stability run; 0 skips it
    pub stability_samples: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticsResponse {
    pub run_id: Uuid,
    pub passed: usize,
    pub total: usize,
    pub report: DiagnosticsReport,
}

/// Self-test the connected adapter
pub async fn run(
    State(state): State<SharedState>,
    Query(query): Query<DiagnosticsQuery>,
) -> ApiResult<Json<DiagnosticsResponse>> {
    let client = state.manager.client().await.ok_or(ObdError::NotConnected)?;
    let mut config = DiagnosticsConfig::default();
    if let Some(samples) = query.stability_samples {
        config.stability_samples = samples;
    }

    let run_id = Uuid::new_v4();
    tracing::info!("Diagnostics run {} on {}", run_id, client.device().name);
    let report = SelfTest::new(&client, config).run().await;
    Ok(Json(DiagnosticsResponse {
        run_id,
        passed: report.passed(),
        total: report.total(),
        report,
    }))
}
