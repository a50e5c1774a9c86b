//! Saga participants: the forward actions and compensations the coordinator
//! calls back, each guarded by the branch barrier.

pub mod cart;
pub mod inventory;
pub mod trade_order;

use std::sync::Arc;

use async_trait::async_trait;
use common::{BranchKey, ParticipantReply};
use serde::de::DeserializeOwned;
use store::{BarrierStore, CartStore, OrderStore, StockStore};

pub use cart::{CartLineRef, CartParticipant, CreateCartLine};
pub use inventory::{InventoryParticipant, StockAdjustment};
pub use trade_order::{CreateTradeOrder, OrderParticipant};

use crate::barrier::BranchBarrier;
use crate::coordinator::{InvokeError, StepInvoker};
use crate::error::ParticipantError;

pub const RESERVE_STOCK: &str = "/stock/reserve";
pub const RELEASE_STOCK: &str = "/stock/reserve-compensate";
pub const CREATE_CART_LINE: &str = "/cart/lines";
pub const REMOVE_CART_LINE: &str = "/cart/lines-compensate";
pub const RETIRE_CART_LINE: &str = "/cart/retire";
pub const RESTORE_CART_LINE: &str = "/cart/retire-compensate";
pub const CREATE_TRADE_ORDER: &str = "/orders";
pub const REMOVE_TRADE_ORDER: &str = "/orders-compensate";

/// All participants of this service, sharing one barrier store.
#[derive(Clone)]
pub struct Participants {
    pub inventory: Arc<InventoryParticipant>,
    pub cart: Arc<CartParticipant>,
    pub orders: Arc<OrderParticipant>,
}

impl Participants {
    pub fn new(
        stock: Arc<dyn StockStore>,
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderStore>,
        barrier_store: Arc<dyn BarrierStore>,
    ) -> Self {
        let barrier = BranchBarrier::new(barrier_store);
        Self {
            inventory: Arc::new(InventoryParticipant::new(stock, barrier.clone())),
            cart: Arc::new(CartParticipant::new(carts, barrier.clone())),
            orders: Arc::new(OrderParticipant::new(orders, barrier)),
        }
    }

    /// Routes a branch callback by its path (relative to the participant
    /// base URL).
    pub async fn dispatch(
        &self,
        path: &str,
        key: &BranchKey,
        payload: serde_json::Value,
    ) -> Result<ParticipantReply, ParticipantError> {
        match path {
            RESERVE_STOCK => self.inventory.reserve(key, &decode(payload)?).await,
            RELEASE_STOCK => self.inventory.release(key, &decode(payload)?).await,
            CREATE_CART_LINE => self.cart.create_line(key, &decode(payload)?).await,
            REMOVE_CART_LINE => self.cart.remove_created_line(key, &decode(payload)?).await,
            RETIRE_CART_LINE => self.cart.retire_line(key, &decode(payload)?).await,
            RESTORE_CART_LINE => self.cart.restore_line(key, &decode(payload)?).await,
            CREATE_TRADE_ORDER => self.orders.create_order(key, &decode(payload)?).await,
            REMOVE_TRADE_ORDER => self.orders.remove_created_order(key, &decode(payload)?).await,
            other => Err(ParticipantError::InvalidRequest(format!(
                "no participant at {other}"
            ))),
        }
    }
}

fn decode<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T, ParticipantError> {
    serde_json::from_value(payload)
        .map_err(|e| ParticipantError::InvalidRequest(format!("malformed payload: {e}")))
}

/// Calls participants directly instead of over HTTP.
///
/// Replies carry the same results the HTTP routes would: storage errors
/// surface as a 500 so the coordinator retries them.
pub struct InProcessInvoker {
    participants: Participants,
    base_url: String,
}

impl InProcessInvoker {
    pub fn new(participants: Participants, base_url: impl Into<String>) -> Self {
        Self {
            participants,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl StepInvoker for InProcessInvoker {
    async fn invoke(
        &self,
        url: &str,
        key: &BranchKey,
        payload: &serde_json::Value,
    ) -> Result<ParticipantReply, InvokeError> {
        let path = url.strip_prefix(self.base_url.as_str()).unwrap_or(url);

        match self.participants.dispatch(path, key, payload.clone()).await {
            Ok(reply) => Ok(reply),
            Err(err @ ParticipantError::Store(_)) => Err(InvokeError::Status {
                status: 500,
                body: err.to_string(),
            }),
            Err(err) => Ok(err.reply()),
        }
    }
}
