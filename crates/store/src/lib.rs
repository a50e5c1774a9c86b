//! Storage for the saga participants.
//!
//! Every concern is a trait (`StockStore`, `CartStore`, `OrderStore`,
//! `BarrierStore`, `ProductCatalog`, `SessionCache`) with an in-memory
//! implementation for tests and a production backend: PostgreSQL for the
//! tables, Redis for sessions.

pub mod barrier;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod session;
pub mod store;

pub use barrier::{BarrierStatus, InsertOutcome};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use session::{InMemorySessionCache, RedisSessionCache};
pub use store::{
    BarrierStore, CartStore, Decrement, OrderStore, ProductCatalog, SessionCache, StockStore,
};
