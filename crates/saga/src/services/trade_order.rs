//! Trade-order write participant.

use std::sync::Arc;

use chrono::Utc;
use common::{BranchKey, ParticipantReply};
use domain::{CartLineId, Money, NewTradeOrder, TradeOrder, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use store::{OrderStore, StoreError};

use crate::barrier::{BranchBarrier, Guarded, SkipReason};
use crate::error::ParticipantError;

/// Attempts at drawing a fresh order number when one collides.
const ORDER_NO_ATTEMPTS: usize = 3;

/// Payload of the create/remove pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTradeOrder {
    pub user_id: UserId,
    pub total_amount: Money,
    pub cart_ids: Vec<CartLineId>,
    pub is_virtual: bool,
    pub recipient_address_id: i64,
}

pub struct OrderParticipant {
    orders: Arc<dyn OrderStore>,
    barrier: BranchBarrier,
}

impl OrderParticipant {
    pub fn new(orders: Arc<dyn OrderStore>, barrier: BranchBarrier) -> Self {
        Self { orders, barrier }
    }

    /// Creates a pending-payment order tagged with the branch's correlation
    /// key.
    #[tracing::instrument(skip(self, req), fields(branch = %key, user_id = %req.user_id))]
    pub async fn create_order(
        &self,
        key: &BranchKey,
        req: &CreateTradeOrder,
    ) -> Result<ParticipantReply, ParticipantError> {
        let correlation_key = key.correlation_key();
        let ck = correlation_key.as_str();

        let guarded = self
            .barrier
            .action(key, move || self.insert_once(req, ck))
            .await?;

        let order = match guarded {
            Guarded::Applied(order) => {
                tracing::info!(order_id = %order.id, order_no = %order.order_no, "trade order created");
                metrics::counter!("trade_orders_created_total").increment(1);
                Some(order)
            }
            Guarded::Skipped(SkipReason::Duplicate) => {
                self.orders.find_order_by_correlation(ck).await?
            }
            Guarded::Skipped(_) => None,
        };

        Ok(match order {
            Some(order) => ParticipantReply::success("trade order created")
                .with_data(json!({ "order_id": order.id, "order_no": order.order_no })),
            None => ParticipantReply::success("trade order creation skipped"),
        })
    }

    async fn insert_once(
        &self,
        req: &CreateTradeOrder,
        correlation_key: &str,
    ) -> Result<TradeOrder, ParticipantError> {
        let mut last = None;
        for _ in 0..ORDER_NO_ATTEMPTS {
            let order = NewTradeOrder::new(
                req.user_id,
                req.total_amount,
                req.cart_ids.clone(),
                req.is_virtual,
                req.recipient_address_id,
                correlation_key,
                Utc::now(),
            )?;

            match self.orders.insert_order(order).await {
                Ok(order) => return Ok(order),
                Err(StoreError::Duplicate(what)) => {
                    if let Some(existing) =
                        self.orders.find_order_by_correlation(correlation_key).await?
                    {
                        return Ok(existing);
                    }
                    // Order number collision; draw another.
                    tracing::debug!(%what, "order number collided");
                    last = Some(StoreError::Duplicate(what));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last
            .unwrap_or_else(|| StoreError::Duplicate(correlation_key.to_string()))
            .into())
    }

    /// Retires the order created by this branch's action, if any.
    #[tracing::instrument(skip(self, _req), fields(branch = %key))]
    pub async fn remove_created_order(
        &self,
        key: &BranchKey,
        _req: &CreateTradeOrder,
    ) -> Result<ParticipantReply, ParticipantError> {
        let correlation_key = key.correlation_key();
        let ck = correlation_key.as_str();

        let guarded = self
            .barrier
            .compensation(key, move || async move {
                Ok(self.orders.retire_order_by_correlation(ck).await?)
            })
            .await?;

        match guarded {
            Guarded::Applied(retired) => tracing::info!(retired, "created trade order retired"),
            Guarded::Skipped(SkipReason::NullCompensation) => {
                if self.orders.retire_order_by_correlation(ck).await? {
                    tracing::warn!("retired a trade order created outside the barrier");
                }
            }
            Guarded::Skipped(_) => {}
        }
        Ok(ParticipantReply::success("trade order removed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BranchId, BranchOp, Gid, TransResult};
    use domain::OrderStatus;
    use store::InMemoryStore;

    fn participant() -> (OrderParticipant, InMemoryStore) {
        let store = InMemoryStore::new();
        let barrier = BranchBarrier::new(Arc::new(store.clone()));
        (OrderParticipant::new(Arc::new(store.clone()), barrier), store)
    }

    fn key() -> BranchKey {
        BranchKey::new(
            Gid::parse("order-g1").unwrap(),
            BranchId::for_step(1),
            BranchOp::Action,
        )
    }

    fn request() -> CreateTradeOrder {
        CreateTradeOrder {
            user_id: UserId::new(5),
            total_amount: Money::from_cents(5997),
            cart_ids: vec![CartLineId::new(1), CartLineId::new(2)],
            is_virtual: false,
            recipient_address_id: 77,
        }
    }

    #[tokio::test]
    async fn test_create_order_once() {
        let (participant, store) = participant();

        let first = participant.create_order(&key(), &request()).await.unwrap();
        let second = participant.create_order(&key(), &request()).await.unwrap();

        assert_eq!(store.order_count().await, 1);
        let first = first.data.unwrap();
        assert_eq!(first["order_id"], 1);
        assert_eq!(second.data.unwrap()["order_no"], first["order_no"]);

        let order = store
            .find_order_by_correlation("order-g1:02")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.order_status, OrderStatus::PendingPayment);
        assert_eq!(order.total_amount, Money::from_cents(5997));
        assert!(order.order_no.starts_with('Y'));
    }

    #[tokio::test]
    async fn test_null_compensation_retires_untracked_order() {
        let (participant, store) = participant();
        let req = request();
        let order = NewTradeOrder::new(
            req.user_id,
            req.total_amount,
            req.cart_ids.clone(),
            req.is_virtual,
            req.recipient_address_id,
            "order-g1:02",
            Utc::now(),
        )
        .unwrap();
        store.insert_order(order).await.unwrap();

        participant.remove_created_order(&key(), &req).await.unwrap();

        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.active_order_count().await, 0);
    }

    #[tokio::test]
    async fn test_compensation_retires_order() {
        let (participant, store) = participant();

        participant.create_order(&key(), &request()).await.unwrap();
        participant
            .remove_created_order(&key(), &request())
            .await
            .unwrap();

        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.active_order_count().await, 0);
    }

    #[tokio::test]
    async fn test_order_without_cart_lines_fails() {
        let (participant, store) = participant();
        let req = CreateTradeOrder {
            cart_ids: Vec::new(),
            ..request()
        };

        let err = participant.create_order(&key(), &req).await.unwrap_err();
        assert_eq!(err.trans_result(), TransResult::Failure);
        assert_eq!(store.order_count().await, 0);
    }
}
