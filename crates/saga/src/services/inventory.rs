//! Inventory reservation participant.

use std::sync::Arc;

use common::{BranchKey, ParticipantReply};
use domain::SkuId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use store::{Decrement, StockStore};

use crate::barrier::{BranchBarrier, Guarded};
use crate::error::ParticipantError;

/// Payload of the reserve/release pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub sku_id: SkuId,
    pub quantity: u32,
}

impl StockAdjustment {
    fn validate(&self) -> Result<(), ParticipantError> {
        if self.quantity == 0 {
            return Err(ParticipantError::InvalidRequest(
                "quantity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decrements stock on the forward action, credits it back on compensation.
pub struct InventoryParticipant {
    stock: Arc<dyn StockStore>,
    barrier: BranchBarrier,
}

impl InventoryParticipant {
    pub fn new(stock: Arc<dyn StockStore>, barrier: BranchBarrier) -> Self {
        Self { stock, barrier }
    }

    /// Takes `quantity` units with one conditional decrement.
    #[tracing::instrument(skip(self), fields(branch = %key, sku_id = %req.sku_id))]
    pub async fn reserve(
        &self,
        key: &BranchKey,
        req: &StockAdjustment,
    ) -> Result<ParticipantReply, ParticipantError> {
        req.validate()?;

        let result = self
            .barrier
            .action(key, move || async move {
                match self.stock.try_decrement(req.sku_id, req.quantity).await? {
                    Decrement::Applied { remaining } => Ok(remaining),
                    Decrement::Insufficient { available } => {
                        Err(ParticipantError::InsufficientStock {
                            sku_id: req.sku_id,
                            requested: req.quantity,
                            available,
                        })
                    }
                    Decrement::UnknownSku => Err(ParticipantError::UnknownSku(req.sku_id)),
                }
            })
            .await;

        let label = match &result {
            Ok(Guarded::Applied(_)) => "reserved",
            Ok(Guarded::Skipped(_)) => "skipped",
            Err(ParticipantError::InsufficientStock { .. }) => "insufficient",
            Err(ParticipantError::UnknownSku(_)) => "unknown_sku",
            Err(_) => "error",
        };
        metrics::counter!("stock_reservations_total", "result" => label).increment(1);

        match result? {
            Guarded::Applied(remaining) => {
                tracing::info!(quantity = req.quantity, remaining, "stock reserved");
                Ok(ParticipantReply::success("stock reserved")
                    .with_data(json!({ "sku_id": req.sku_id, "remaining": remaining })))
            }
            Guarded::Skipped(reason) => Ok(ParticipantReply::success(format!(
                "reservation skipped: {}",
                reason.as_str()
            ))),
        }
    }

    /// Credits `quantity` units back if the reservation was applied.
    #[tracing::instrument(skip(self), fields(branch = %key, sku_id = %req.sku_id))]
    pub async fn release(
        &self,
        key: &BranchKey,
        req: &StockAdjustment,
    ) -> Result<ParticipantReply, ParticipantError> {
        req.validate()?;

        let guarded = self
            .barrier
            .compensation(key, move || async move {
                Ok(self.stock.increment(req.sku_id, req.quantity).await?)
            })
            .await?;

        match guarded {
            Guarded::Applied(stock) => {
                tracing::info!(quantity = req.quantity, stock, "stock released");
                Ok(ParticipantReply::success("stock released")
                    .with_data(json!({ "sku_id": req.sku_id, "remaining": stock })))
            }
            Guarded::Skipped(reason) => Ok(ParticipantReply::success(format!(
                "release skipped: {}",
                reason.as_str()
            ))),
        }
    }
}
