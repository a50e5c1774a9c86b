//! Domain layer for the cart and trade-order saga participants.
//!
//! This crate provides:
//! - Row identifiers and the `Money` value object
//! - Product, stock, cart-line and trade-order models
//! - User key derivation from the client token
//! - Order-number generation

pub mod cart;
pub mod error;
pub mod inventory;
pub mod session;
pub mod trade_order;
pub mod value_objects;

pub use cart::{CartLine, NewCartLine};
pub use error::DomainError;
pub use inventory::{Product, StockRecord, validate_quantity};
pub use session::{session_cache_key, user_key_from_token};
pub use trade_order::{NewTradeOrder, OrderStatus, TradeOrder, generate_order_no};
pub use value_objects::{CartLineId, Money, OrderId, ProductId, SkuId, UserId};
