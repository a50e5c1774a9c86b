//! Domain error types.

use thiserror::Error;

/// Errors raised while validating domain input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Quantities must be at least one unit.
    #[error("Invalid quantity {0}: must be at least 1")]
    InvalidQuantity(i64),

    /// The client token could not be turned into a user key.
    #[error("Invalid client token: {0}")]
    InvalidToken(String),

    /// Prices and totals may not be negative.
    #[error("Invalid amount {0} cents: must not be negative")]
    NegativeAmount(i64),

    /// An order must reference at least one cart line.
    #[error("Order has no cart lines")]
    NoCartLines,
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
