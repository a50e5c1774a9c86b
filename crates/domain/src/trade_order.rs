//! Trade-order model and order-number generation.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::value_objects::{CartLineId, Money, OrderId, UserId};

/// Minutes an unpaid order stays open after submission.
pub const ORDER_EXPIRY_MINUTES: i64 = 30;

/// Lifecycle status of a trade order.
///
/// Only `PendingPayment` is produced here; the remaining states belong to the
/// payment and fulfilment side and are kept so stored rows round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    PendingPayment,
    Closed,
    Paid,
    Shipped,
    Received,
    Completed,
    Reviewed,
}

impl OrderStatus {
    /// Numeric code stored in `trade_order.order_status`.
    pub fn code(&self) -> i16 {
        match self {
            OrderStatus::PendingPayment => 1,
            OrderStatus::Closed => 2,
            OrderStatus::Paid => 3,
            OrderStatus::Shipped => 4,
            OrderStatus::Received => 5,
            OrderStatus::Completed => 6,
            OrderStatus::Reviewed => 7,
        }
    }

    /// Inverse of [`OrderStatus::code`].
    pub fn from_code(code: i16) -> Option<Self> {
        Some(match code {
            1 => OrderStatus::PendingPayment,
            2 => OrderStatus::Closed,
            3 => OrderStatus::Paid,
            4 => OrderStatus::Shipped,
            5 => OrderStatus::Received,
            6 => OrderStatus::Completed,
            7 => OrderStatus::Reviewed,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PendingPayment",
            OrderStatus::Closed => "Closed",
            OrderStatus::Paid => "Paid",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Received => "Received",
            OrderStatus::Completed => "Completed",
            OrderStatus::Reviewed => "Reviewed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted trade order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOrder {
    pub id: OrderId,
    pub order_no: String,
    pub user_id: UserId,
    pub total_amount: Money,
    pub order_status: OrderStatus,
    pub cart_ids: Vec<CartLineId>,
    pub is_virtual: bool,
    pub recipient_address_id: i64,
    pub is_deleted: bool,
    pub correlation_key: String,
    pub submit_time: DateTime<Utc>,
    pub expire_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeOrder {
    /// Returns true if the order was not retired by a compensation.
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    /// Returns true if the payment window has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_time
    }
}

/// Fields of a trade order about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTradeOrder {
    pub order_no: String,
    pub user_id: UserId,
    pub total_amount: Money,
    pub order_status: OrderStatus,
    pub cart_ids: Vec<CartLineId>,
    pub is_virtual: bool,
    pub recipient_address_id: i64,
    pub correlation_key: String,
    pub submit_time: DateTime<Utc>,
    pub expire_time: DateTime<Utc>,
}

impl NewTradeOrder {
    /// Builds a pending-payment order submitted at `now`.
    pub fn new(
        user_id: UserId,
        total_amount: Money,
        cart_ids: Vec<CartLineId>,
        is_virtual: bool,
        recipient_address_id: i64,
        correlation_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if cart_ids.is_empty() {
            return Err(DomainError::NoCartLines);
        }
        if total_amount.is_negative() {
            return Err(DomainError::NegativeAmount(total_amount.cents()));
        }

        Ok(Self {
            order_no: generate_order_no(user_id, now),
            user_id,
            total_amount,
            order_status: OrderStatus::PendingPayment,
            cart_ids,
            is_virtual,
            recipient_address_id,
            correlation_key: correlation_key.into(),
            submit_time: now,
            expire_time: now + Duration::minutes(ORDER_EXPIRY_MINUTES),
        })
    }

    /// Materializes the order with its store-assigned id.
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> TradeOrder {
        TradeOrder {
            id,
            order_no: self.order_no,
            user_id: self.user_id,
            total_amount: self.total_amount,
            order_status: self.order_status,
            cart_ids: self.cart_ids,
            is_virtual: self.is_virtual,
            recipient_address_id: self.recipient_address_id,
            is_deleted: false,
            correlation_key: self.correlation_key,
            submit_time: self.submit_time,
            expire_time: self.expire_time,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Generates an order number: `Y`, the millisecond timestamp, the user key
/// and a six-digit random suffix.
pub fn generate_order_no(user_id: UserId, now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    format!("Y{}{}{}", now.format("%Y%m%d%H%M%S%3f"), user_id, suffix)
}
