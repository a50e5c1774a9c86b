//! Cart-line write participant.
//!
//! Two forward/compensation pairs live here: creating a line (add to cart)
//! and retiring a line (turning it into an order).

use std::sync::Arc;

use common::{BranchKey, ParticipantReply};
use domain::{CartLine, CartLineId, NewCartLine, ProductId, SkuId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use store::{CartStore, StoreError};

use crate::barrier::{BranchBarrier, Guarded, SkipReason};
use crate::error::ParticipantError;

/// Payload of the create/remove pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub sku_id: SkuId,
    pub product_name: String,
    pub product_main_picture: String,
    pub quantity: u32,
}

/// Payload of the retire/restore pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineRef {
    pub cart_id: CartLineId,
}

pub struct CartParticipant {
    carts: Arc<dyn CartStore>,
    barrier: BranchBarrier,
}

impl CartParticipant {
    pub fn new(carts: Arc<dyn CartStore>, barrier: BranchBarrier) -> Self {
        Self { carts, barrier }
    }

    /// Creates the line, tagged with the branch's correlation key.
    ///
    /// A redelivery answers with the id of the line already created.
    #[tracing::instrument(skip(self, req), fields(branch = %key, sku_id = %req.sku_id))]
    pub async fn create_line(
        &self,
        key: &BranchKey,
        req: &CreateCartLine,
    ) -> Result<ParticipantReply, ParticipantError> {
        if req.quantity == 0 {
            return Err(ParticipantError::InvalidRequest(
                "quantity must be at least 1".to_string(),
            ));
        }

        let correlation_key = key.correlation_key();
        let ck = correlation_key.as_str();
        let guarded = self
            .barrier
            .action(key, move || self.insert_once(req, ck))
            .await?;

        let line = match guarded {
            Guarded::Applied(line) => {
                tracing::info!(cart_id = %line.id, "cart line created");
                Some(line)
            }
            Guarded::Skipped(SkipReason::Duplicate) => {
                self.carts.find_line_by_correlation(&correlation_key).await?
            }
            Guarded::Skipped(_) => None,
        };

        Ok(match line {
            Some(line) => ParticipantReply::success("cart line created")
                .with_data(json!({ "cart_id": line.id })),
            None => ParticipantReply::success("cart line creation skipped"),
        })
    }

    async fn insert_once(
        &self,
        req: &CreateCartLine,
        correlation_key: &str,
    ) -> Result<CartLine, ParticipantError> {
        let line = NewCartLine {
            user_id: req.user_id,
            product_id: req.product_id,
            sku_id: req.sku_id,
            product_name: req.product_name.clone(),
            product_main_picture: req.product_main_picture.clone(),
            quantity: req.quantity,
            correlation_key: correlation_key.to_string(),
        };

        match self.carts.insert_line(line).await {
            Ok(line) => Ok(line),
            // Left over from a delivery that crashed after the insert.
            Err(StoreError::Duplicate(_)) => self
                .carts
                .find_line_by_correlation(correlation_key)
                .await?
                .ok_or_else(|| {
                    ParticipantError::Store(StoreError::NotFound(correlation_key.to_string()))
                }),
            Err(e) => Err(e.into()),
        }
    }

    /// Retires the line created by this branch's action, if any.
    #[tracing::instrument(skip(self, _req), fields(branch = %key))]
    pub async fn remove_created_line(
        &self,
        key: &BranchKey,
        _req: &CreateCartLine,
    ) -> Result<ParticipantReply, ParticipantError> {
        let correlation_key = key.correlation_key();
        let ck = correlation_key.as_str();
        let guarded = self
            .barrier
            .compensation(key, move || async move {
                Ok(self.carts.retire_line_by_correlation(ck).await?)
            })
            .await?;

        match guarded {
            Guarded::Applied(retired) => tracing::info!(retired, "created cart line retired"),
            // Retiring is idempotent, so sweep up a line the barrier never saw.
            Guarded::Skipped(SkipReason::NullCompensation) => {
                if self.carts.retire_line_by_correlation(ck).await? {
                    tracing::warn!("retired a cart line created outside the barrier");
                }
            }
            Guarded::Skipped(_) => {}
        }
        Ok(ParticipantReply::success("cart line removed"))
    }

    /// Retires an existing line so it cannot be ordered twice.
    #[tracing::instrument(skip(self), fields(branch = %key, cart_id = %req.cart_id))]
    pub async fn retire_line(
        &self,
        key: &BranchKey,
        req: &CartLineRef,
    ) -> Result<ParticipantReply, ParticipantError> {
        let guarded = self
            .barrier
            .action(key, move || async move {
                if self.carts.retire_line(req.cart_id).await? {
                    Ok(())
                } else {
                    Err(ParticipantError::CartLineUnavailable(req.cart_id))
                }
            })
            .await?;

        Ok(match guarded {
            Guarded::Applied(()) => ParticipantReply::success("cart line retired"),
            Guarded::Skipped(reason) => {
                ParticipantReply::success(format!("retire skipped: {}", reason.as_str()))
            }
        })
    }

    /// Puts a retired line back into the cart.
    #[tracing::instrument(skip(self), fields(branch = %key, cart_id = %req.cart_id))]
    pub async fn restore_line(
        &self,
        key: &BranchKey,
        req: &CartLineRef,
    ) -> Result<ParticipantReply, ParticipantError> {
        let guarded = self
            .barrier
            .compensation(key, move || async move {
                Ok(self.carts.restore_line(req.cart_id).await?)
            })
            .await?;

        if let Guarded::Applied(restored) = guarded {
            tracing::info!(restored, "cart line restored");
        }
        Ok(ParticipantReply::success("cart line restored"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BranchId, BranchOp, Gid};
    use store::InMemoryStore;

    fn participant() -> (CartParticipant, InMemoryStore) {
        let store = InMemoryStore::new();
        let barrier = BranchBarrier::new(Arc::new(store.clone()));
        (CartParticipant::new(Arc::new(store.clone()), barrier), store)
    }

    fn key(gid: &str, step: usize) -> BranchKey {
        BranchKey::new(
            Gid::parse(gid).unwrap(),
            BranchId::for_step(step),
            BranchOp::Action,
        )
    }

    fn request() -> CreateCartLine {
        CreateCartLine {
            user_id: UserId::new(5),
            product_id: ProductId::new(10),
            sku_id: SkuId::new(1),
            product_name: "Widget".to_string(),
            product_main_picture: "widget.png".to_string(),
            quantity: 3,
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (participant, store) = participant();

        let first = participant.create_line(&key("g1", 1), &request()).await.unwrap();
        let second = participant.create_line(&key("g1", 1), &request()).await.unwrap();

        assert_eq!(store.cart_line_count().await, 1);
        assert_eq!(first.data.unwrap()["cart_id"], 1);
        assert_eq!(second.data.unwrap()["cart_id"], 1);
    }

    #[tokio::test]
    async fn test_compensation_retires_created_line() {
        let (participant, store) = participant();

        participant.create_line(&key("g1", 1), &request()).await.unwrap();
        participant
            .remove_created_line(&key("g1", 1), &request())
            .await
            .unwrap();
        participant
            .remove_created_line(&key("g1", 1), &request())
            .await
            .unwrap();

        assert_eq!(store.active_cart_line_count().await, 0);
        let line = store.find_line_by_correlation("g1:02").await.unwrap().unwrap();
        assert!(line.is_deleted);
    }

    #[tokio::test]
    async fn test_compensation_without_create_blocks_late_create() {
        let (participant, store) = participant();

        participant
            .remove_created_line(&key("g1", 1), &request())
            .await
            .unwrap();
        let late = participant.create_line(&key("g1", 1), &request()).await.unwrap();

        assert!(late.is_success());
        assert!(late.data.is_none());
        assert_eq!(store.cart_line_count().await, 0);
    }

    #[tokio::test]
    async fn test_null_compensation_retires_untracked_line() {
        let (participant, store) = participant();
        store
            .insert_line(NewCartLine {
                user_id: UserId::new(5),
                product_id: ProductId::new(10),
                sku_id: SkuId::new(1),
                product_name: "Widget".to_string(),
                product_main_picture: String::new(),
                quantity: 3,
                correlation_key: "g3:02".to_string(),
            })
            .await
            .unwrap();

        let reply = participant
            .remove_created_line(&key("g3", 1), &request())
            .await
            .unwrap();

        assert!(reply.is_success());
        assert_eq!(store.active_cart_line_count().await, 0);
    }

    #[tokio::test]
    async fn test_retire_and_restore() {
        let (participant, store) = participant();
        let created = store
            .insert_line(NewCartLine {
                user_id: UserId::new(5),
                product_id: ProductId::new(10),
                sku_id: SkuId::new(1),
                product_name: "Widget".to_string(),
                product_main_picture: String::new(),
                quantity: 1,
                correlation_key: "seed:01".to_string(),
            })
            .await
            .unwrap();
        let req = CartLineRef {
            cart_id: created.id,
        };

        participant.retire_line(&key("g2", 0), &req).await.unwrap();
        assert!(store.get_line(created.id).await.unwrap().unwrap().is_deleted);

        participant.restore_line(&key("g2", 0), &req).await.unwrap();
        assert!(store.get_line(created.id).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_retiring_retired_line_fails() {
        let (participant, _) = participant();
        let req = CartLineRef {
            cart_id: CartLineId::new(42),
        };

        let err = participant.retire_line(&key("g2", 0), &req).await.unwrap_err();
        assert!(matches!(err, ParticipantError::CartLineUnavailable(_)));

        // Its compensation is a null compensation and restores nothing.
        let reply = participant.restore_line(&key("g2", 0), &req).await.unwrap();
        assert!(reply.is_success());
    }
}
