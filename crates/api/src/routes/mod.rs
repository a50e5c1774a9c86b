//! HTTP handlers.

pub mod cart;
pub mod ops;
pub mod orders;
pub mod participants;

use axum::http::HeaderMap;

use crate::error::ApiError;

/// Header carrying the client token.
pub const TOKEN_HEADER: &str = "uuid";

/// Reads the client token from the `uuid` header.
pub(crate) fn client_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingToken)
}

/// Maps a saga report onto the client envelope.
///
/// Committed is `SUCCESS`; compensated is `FAIL` (409); indeterminate is
/// `INDETERMINATE` (504) with the gid in `data` for reconciliation.
pub(crate) fn report_response(report: saga::SagaReport) -> axum::response::Response {
    use axum::http::StatusCode;
    use saga::SagaOutcome;

    use crate::error::{Envelope, FAIL, INDETERMINATE, SUCCESS};

    let (status, code, message) = match &report.outcome {
        SagaOutcome::Committed => (StatusCode::OK, SUCCESS, "ok".to_string()),
        SagaOutcome::Compensated { reason, .. } => (StatusCode::CONFLICT, FAIL, reason.clone()),
        SagaOutcome::Indeterminate { reason } => (
            StatusCode::GATEWAY_TIMEOUT,
            INDETERMINATE,
            format!("outcome unknown, reconcile with gid {}: {reason}", report.gid),
        ),
    };

    let data = serde_json::to_value(&report).unwrap_or(serde_json::Value::Null);
    Envelope::new(code, message, data).with_status(status)
}
