//! Client trade-order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use domain::{OrderId, TradeOrder, UserId};
use saga::PlaceOrderRequest;

use super::{client_token, report_response};
use crate::AppState;
use crate::error::{ApiError, Envelope};

/// POST /orders/advance: turns cart lines into a pending-payment order.
#[tracing::instrument(skip(state, headers, body))]
pub async fn advance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let token = client_token(&headers)?;
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let report = state.workflows.place_order(token, &req).await?;
    Ok(report_response(report))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, headers))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let order = state.orders.get_order(OrderId::new(id)).await?;
    order_response(order, user_id, &id.to_string())
}

/// GET /orders/by-no/{order_no}
#[tracing::instrument(skip(state, headers))]
pub async fn by_no(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(order_no): Path<String>,
) -> Result<Response, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let order = state.orders.find_order_by_no(&order_no).await?;
    order_response(order, user_id, &order_no)
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    Ok(state
        .workflows
        .gate()
        .authenticate(client_token(headers)?)
        .await?)
}

fn order_response(
    order: Option<TradeOrder>,
    user_id: UserId,
    what: &str,
) -> Result<Response, ApiError> {
    let order = order
        .filter(|order| order.user_id == user_id)
        .ok_or_else(|| ApiError::NotFound(format!("Order {what} not found")))?;

    let data = serde_json::to_value(&order).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Envelope::success(data).with_status(StatusCode::OK))
}
