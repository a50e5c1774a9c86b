//! Saga error types.

use common::{ParticipantReply, TransResult};
use domain::{CartLineId, DomainError, ProductId, SkuId};
use store::StoreError;
use thiserror::Error;

use crate::state::SagaState;

/// Errors that can occur while building or submitting a saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A saga needs at least one step.
    #[error("Saga has no steps")]
    EmptySaga,

    /// The saga state machine refused a transition.
    #[error("Invalid saga transition from {from} to {to}")]
    InvalidTransition { from: SagaState, to: SagaState },

    /// The coordinator refused the submission; nothing was applied.
    #[error("Coordinator rejected saga ({status}): {message}")]
    CoordinatorRejected { status: u16, message: String },

    /// The request failed the pre-check gate; no saga was submitted.
    #[error(transparent)]
    PreCheck(#[from] PreCheckError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Errors raised by a participant handler.
///
/// Each variant maps onto the result the coordinator sees: business failures
/// trigger compensation, `InFlight` asks for a retry, storage errors are
/// retried by the coordinator.
#[derive(Debug, Error)]
pub enum ParticipantError {
    /// The callback carried an unusable payload or transaction identifier.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient stock for sku {sku_id}: requested {requested}, available {available}")]
    InsufficientStock {
        sku_id: SkuId,
        requested: u32,
        available: i64,
    },

    #[error("Unknown sku: {0}")]
    UnknownSku(SkuId),

    /// The cart line is missing or was already retired.
    #[error("Cart line {0} is no longer available")]
    CartLineUnavailable(CartLineId),

    /// The same branch is being processed by another delivery.
    #[error("Branch {0} is still in flight")]
    InFlight(String),

    /// Domain validation error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ParticipantError {
    /// Result reported to the coordinator.
    ///
    /// Storage errors report `Ongoing` so that the coordinator retries the
    /// branch instead of compensating.
    pub fn trans_result(&self) -> TransResult {
        match self {
            ParticipantError::InFlight(_) | ParticipantError::Store(_) => TransResult::Ongoing,
            _ => TransResult::Failure,
        }
    }

    /// Short machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            ParticipantError::InvalidRequest(_) => "invalid_request",
            ParticipantError::InsufficientStock { .. } => "insufficient_stock",
            ParticipantError::UnknownSku(_) => "unknown_sku",
            ParticipantError::CartLineUnavailable(_) => "cart_line_unavailable",
            ParticipantError::InFlight(_) => "in_flight",
            ParticipantError::Domain(_) => "invalid_request",
            ParticipantError::Store(_) => "store_error",
        }
    }

    /// Whether the failed effect is known to have changed nothing.
    ///
    /// Only storage errors can leave a write behind; the rest are raised
    /// before or instead of any write.
    pub fn leaves_no_effect(&self) -> bool {
        match self {
            ParticipantError::Store(err) => err.is_definite(),
            _ => true,
        }
    }

    /// Reply body for this error.
    pub fn reply(&self) -> ParticipantReply {
        match self.trans_result() {
            TransResult::Failure => ParticipantReply::failure(self.reason(), self.to_string()),
            _ => ParticipantReply {
                reason: Some(self.reason().to_string()),
                ..ParticipantReply::ongoing(self.to_string())
            },
        }
    }
}

/// Reasons a request is refused before any saga is submitted.
#[derive(Debug, Error)]
pub enum PreCheckError {
    #[error("Not logged in: {0}")]
    Unauthenticated(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Product {0} is not available")]
    ProductUnavailable(ProductId),

    #[error("Unknown sku: {0}")]
    UnknownSku(SkuId),

    #[error("Sku {sku_id} does not belong to product {product_id}")]
    SkuMismatch { sku_id: SkuId, product_id: ProductId },

    #[error("Insufficient stock for sku {sku_id}: requested {requested}, available {available}")]
    InsufficientStock {
        sku_id: SkuId,
        requested: u32,
        available: i64,
    },

    #[error("Cart line {0} not found")]
    CartLineNotFound(CartLineId),

    #[error("Cart line {0} is no longer available")]
    CartLineUnavailable(CartLineId),

    #[error("Cart line {0} belongs to another user")]
    CartLineNotOwned(CartLineId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<DomainError> for PreCheckError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidToken(reason) => PreCheckError::Unauthenticated(reason),
            other => PreCheckError::InvalidRequest(other.to_string()),
        }
    }
}
