//! Live Data Routes

use axum::{
    extract::{Query, State},
    Json,
};
use alerting::Status;
use obd_protocol::Pid;
use obd_scheduler::{HistoryPoint, Snapshot, BOOST_METRIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct DataResponse {
    pub connected: bool,
    pub polling: bool,
    pub snapshot: Option<Snapshot>,
    pub boost_psi: Option<f64>,
    /// Threshold status of every monitored channel in the snapshot
    pub statuses: BTreeMap<&'static str, Status>,
    pub skipped_ticks: u64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Single channel; all channels when absent
    pub metric: Option<String>,
}

fn metric_names() -> impl Iterator<Item = &'static str> {
    Pid::ALL
        .iter()
        .map(Pid::name)
        .chain(std::iter::once(BOOST_METRIC))
}

/// Latest snapshot with derived values
pub async fn get_data(State(state): State<SharedState>) -> Json<DataResponse> {
    let connected = state
        .manager
        .client()
        .await
        .map(|c| c.is_connected())
        .unwrap_or(false);

    let Some(poller) = state.poller().await else {
        return Json(DataResponse {
            connected,
            polling: false,
            snapshot: None,
            boost_psi: None,
            statuses: BTreeMap::new(),
            skipped_ticks: 0,
        });
    };

    let (snapshot, boost_psi) = {
        let live = poller.live();
        let live = live.read().await;
        (live.snapshot.clone(), live.boost_psi)
    };

    let mut statuses = BTreeMap::new();
    if let Some(snapshot) = &snapshot {
        let alerts = state.alerts.lock().await;
        for reading in &snapshot.readings {
            let name = reading.pid.name();
            if alerts.thresholds().for_metric(name).is_some() {
                statuses.insert(name, alerts.thresholds().status(name, reading.value()));
            }
        }
    }

    Json(DataResponse {
        connected,
        polling: true,
        snapshot,
        boost_psi,
        statuses,
        skipped_ticks: poller.skipped_ticks(),
    })
}

/// Recent values per channel, oldest first
pub async fn get_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<BTreeMap<String, Vec<HistoryPoint>>>> {
    if let Some(metric) = &query.metric {
        if !metric_names().any(|m| m == metric.as_str()) {
            return Err(ApiError::NotFound(format!("Unknown metric: {}", metric)));
        }
    }

    let mut history = BTreeMap::new();
    let Some(poller) = state.poller().await else {
        return Ok(Json(history));
    };
    let live = poller.live();
    let live = live.read().await;
    for name in metric_names() {
        if query.metric.as_deref().map_or(true, |m| m == name) {
            history.insert(name.to_string(), live.series(name));
        }
    }
    Ok(Json(history))
}
