//! Branch callbacks from the saga coordinator.
//!
//! `POST /saga/{path}?gid=..&trans_type=saga&branch_id=..&op=..` with the
//! step payload as JSON body. The reply body is read by the coordinator:
//! 200 `SUCCESS`, 409 `FAILURE` (compensate), 425 `ONGOING` (retry later),
//! 400 for an unusable request, 500 when storage failed.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{BranchId, BranchKey, BranchOp, Gid, ParticipantReply, TransResult};
use saga::ParticipantError;
use serde::Deserialize;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BranchQuery {
    pub gid: String,
    pub branch_id: String,
    #[serde(default)]
    pub trans_type: Option<String>,
    #[serde(default)]
    pub op: Option<String>,
}

/// POST /saga/{*path}: runs one branch through its participant.
#[tracing::instrument(skip(state, query, body), fields(gid, branch_id))]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    query: Result<Query<BranchQuery>, QueryRejection>,
    body: Bytes,
) -> Response {
    let path = format!("/{}", path.trim_start_matches('/'));

    let key = match query {
        Ok(Query(query)) => branch_key(&path, &query),
        Err(rejection) => Err(rejection.body_text()),
    };
    let key = match key {
        Ok(key) => key,
        Err(message) => return bad_request(message),
    };
    let span = tracing::Span::current();
    span.record("gid", key.gid.as_str());
    span.record("branch_id", key.branch_id.as_str());

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => return bad_request(format!("malformed payload: {e}")),
    };

    let response = match state.participants.dispatch(&path, &key, payload).await {
        Ok(reply) => reply_response(reply),
        Err(err) => error_response(err),
    };
    metrics::counter!(
        "participant_callbacks_total",
        "op" => key.op.as_str(),
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}

fn branch_key(path: &str, query: &BranchQuery) -> Result<BranchKey, String> {
    if let Some(trans_type) = &query.trans_type
        && trans_type != "saga"
    {
        return Err(format!("unsupported trans_type {trans_type}"));
    }

    let gid = Gid::parse(&query.gid).map_err(|e| e.to_string())?;
    let branch_id = BranchId::parse(&query.branch_id).map_err(|e| e.to_string())?;

    // The route decides which side of the pair runs.
    let op = if path.ends_with("-compensate") {
        BranchOp::Compensate
    } else {
        BranchOp::Action
    };
    if let Some(declared) = &query.op
        && declared != op.as_str()
    {
        tracing::debug!(%declared, route = op.as_str(), "op query differs from route");
    }

    Ok(BranchKey::new(gid, branch_id, op))
}

fn reply_response(reply: ParticipantReply) -> Response {
    let status = match reply.dtm_result {
        TransResult::Success => StatusCode::OK,
        TransResult::Failure => StatusCode::CONFLICT,
        TransResult::Ongoing => StatusCode::TOO_EARLY,
    };
    (status, Json(reply)).into_response()
}

fn error_response(err: ParticipantError) -> Response {
    let reply = err.reply();
    match err {
        ParticipantError::InvalidRequest(_) | ParticipantError::Domain(_) => {
            tracing::warn!(error = %err, "participant rejected request");
            (StatusCode::BAD_REQUEST, Json(reply)).into_response()
        }
        ParticipantError::Store(_) => {
            tracing::error!(error = %err, "participant storage error");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(reply)).into_response()
        }
        _ => {
            tracing::info!(error = %err, "branch not applied");
            reply_response(reply)
        }
    }
}

fn bad_request(message: String) -> Response {
    tracing::warn!(%message, "malformed branch callback");
    (
        StatusCode::BAD_REQUEST,
        Json(ParticipantReply::failure("invalid_request", message)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(gid: &str, branch_id: &str) -> BranchQuery {
        BranchQuery {
            gid: gid.to_string(),
            branch_id: branch_id.to_string(),
            trans_type: Some("saga".to_string()),
            op: None,
        }
    }

    #[test]
    fn test_op_follows_route() {
        let key = branch_key("/stock/reserve", &query("g1", "01")).unwrap();
        assert_eq!(key.op, BranchOp::Action);

        let key = branch_key("/stock/reserve-compensate", &query("g1", "01")).unwrap();
        assert_eq!(key.op, BranchOp::Compensate);
        assert_eq!(key.correlation_key(), "g1:01");
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        assert!(branch_key("/stock/reserve", &query("", "01")).is_err());

        let mut msg = query("g1", "01");
        msg.trans_type = Some("tcc".to_string());
        assert!(branch_key("/stock/reserve", &msg).is_err());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            reply_response(ParticipantReply::success("ok")).status(),
            StatusCode::OK
        );
        assert_eq!(
            reply_response(ParticipantReply::failure("insufficient_stock", "no")).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_response(ParticipantError::InFlight("g1/01/action".to_string())).status(),
            StatusCode::TOO_EARLY
        );
        assert_eq!(
            error_response(ParticipantError::InvalidRequest("bad".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
