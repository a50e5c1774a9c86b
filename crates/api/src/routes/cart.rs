//! Client cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use domain::CartLineId;
use saga::AddToCartRequest;

use super::{client_token, report_response};
use crate::AppState;
use crate::error::{ApiError, Envelope};

/// POST /cart/add: reserves stock and creates a cart line in one saga.
#[tracing::instrument(skip(state, headers, body))]
pub async fn add(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<AddToCartRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let token = client_token(&headers)?;
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let report = state.workflows.add_to_cart(token, &req).await?;
    Ok(report_response(report))
}

/// GET /cart/lines/{id}: one of the caller's cart lines.
#[tracing::instrument(skip(state, headers))]
pub async fn get_line(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let user_id = state
        .workflows
        .gate()
        .authenticate(client_token(&headers)?)
        .await?;

    let line = state
        .carts
        .get_line(CartLineId::new(id))
        .await?
        .filter(|line| line.user_id == user_id)
        .ok_or_else(|| ApiError::NotFound(format!("Cart line {id} not found")))?;

    let data = serde_json::to_value(&line).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Envelope::success(data).with_status(axum::http::StatusCode::OK))
}
