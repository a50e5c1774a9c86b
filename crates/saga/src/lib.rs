//! Saga orchestration for the cart and trade-order flows.
//!
//! A saga is an ordered list of steps, each a forward action paired with a
//! compensation. The [`SagaSubmitter`] hands a built saga to a
//! [`Coordinator`], which runs the forward actions in order and, when one
//! fails, the compensations of the completed steps in reverse.
//!
//! Participants ([`services`]) implement the steps. Every handler runs
//! through the [`BranchBarrier`] so redelivered and reordered callbacks
//! apply at most once.

pub mod barrier;
pub mod coordinator;
pub mod dtm;
pub mod error;
pub mod precheck;
pub mod services;
pub mod state;
pub mod step;
pub mod submitter;
pub mod workflows;

pub use barrier::{BranchBarrier, Guarded, SkipReason};
pub use coordinator::{
    Coordinator, CoordinatorError, HttpStepInvoker, InvokeError, LocalCoordinator, StepInvoker,
};
pub use dtm::DtmCoordinator;
pub use error::{ParticipantError, PreCheckError, SagaError};
pub use precheck::{AddToCartPlan, PlaceOrderPlan, PreCheckGate};
pub use services::{InProcessInvoker, Participants};
pub use state::{SagaOutcome, SagaState};
pub use step::{Saga, SagaBuilder, SagaStep};
pub use submitter::{SagaReport, SagaSubmitter};
pub use workflows::{AddToCartRequest, Endpoints, PlaceOrderRequest, ShopWorkflows};
