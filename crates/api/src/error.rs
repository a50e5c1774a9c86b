//! Client-facing response envelope and API errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{PreCheckError, SagaError};
use serde::Serialize;

/// Result codes carried in [`Envelope::code`].
pub const SUCCESS: &str = "SUCCESS";
pub const FAIL: &str = "FAIL";
pub const TOKEN_FAIL: &str = "TOKEN_FAIL";
pub const INDETERMINATE: &str = "INDETERMINATE";

/// Body of every client endpoint response.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: &'static str,
    pub message: String,
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(code: &'static str, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn success(data: serde_json::Value) -> Self {
        Self::new(SUCCESS, "ok", data)
    }

    /// Pairs the envelope with a status code.
    pub fn with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The `uuid` header is missing.
    MissingToken,
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga error, including pre-check refusals.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                TOKEN_FAIL,
                "missing uuid header".to_string(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, FAIL, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, FAIL, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, FAIL, msg)
            }
        };

        Envelope::new(code, message, serde_json::Value::Null).with_status(status)
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        SagaError::PreCheck(pre) => {
            let (status, code) = precheck_status(&pre);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(error = %pre, "pre-check failed");
            }
            (status, code, message)
        }
        SagaError::CoordinatorRejected { status, .. } => {
            tracing::warn!(status, "coordinator rejected saga");
            (StatusCode::BAD_GATEWAY, FAIL, message)
        }
        SagaError::EmptySaga
        | SagaError::InvalidTransition { .. }
        | SagaError::Serialization(_) => {
            tracing::error!(error = %message, "saga error");
            (StatusCode::INTERNAL_SERVER_ERROR, FAIL, message)
        }
    }
}

fn precheck_status(err: &PreCheckError) -> (StatusCode, &'static str) {
    match err {
        PreCheckError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, TOKEN_FAIL),
        PreCheckError::InvalidRequest(_) | PreCheckError::SkuMismatch { .. } => {
            (StatusCode::BAD_REQUEST, FAIL)
        }
        PreCheckError::ProductUnavailable(_)
        | PreCheckError::UnknownSku(_)
        | PreCheckError::CartLineNotFound(_) => (StatusCode::NOT_FOUND, FAIL),
        PreCheckError::CartLineNotOwned(_) => (StatusCode::FORBIDDEN, FAIL),
        PreCheckError::InsufficientStock { .. } | PreCheckError::CartLineUnavailable(_) => {
            (StatusCode::CONFLICT, FAIL)
        }
        PreCheckError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, FAIL),
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<PreCheckError> for ApiError {
    fn from(err: PreCheckError) -> Self {
        ApiError::Saga(SagaError::PreCheck(err))
    }
}

impl From<store::StoreError> for ApiError {
    fn from(err: store::StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
