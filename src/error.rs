use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::store::StoreError;
use crate::tracker::TrackerError;
use crate::utils::{error_codes, error_to_api_response};

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    Validation(String),
    Conflict(String),
    NotFound(String),
    InternalServerError(String),
}

impl From<TrackerError> for AppError {
    fn from(e: TrackerError) -> Self {
        match e {
            TrackerError::Validation(msg) => AppError::Validation(msg),
            TrackerError::Conflict(msg) => AppError::Conflict(msg),
            TrackerError::NotFound(msg) => AppError::NotFound(msg),
            TrackerError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::InternalServerError(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "未授权访问".to_string(),
            ),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR, msg)
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, error_codes::CONFLICT, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_codes::INTERNAL_ERROR,
                    "内部服务器错误".to_string(),
                )
            }
        };

        (status, error_to_api_response::<()>(code, error_message)).into_response()
    }
}
