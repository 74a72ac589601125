//! API error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use obd_protocol::ObdError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Obd(#[from] ObdError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Obd(e) => match e {
                ObdError::NotConnected | ObdError::ConnectInProgress => StatusCode::CONFLICT,
                ObdError::ConnectionTimeout(_) | ObdError::CommandTimeout { .. } => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                ObdError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                ObdError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
                ObdError::InvalidAddress(_) | ObdError::UnsupportedPid(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
