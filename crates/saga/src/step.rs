//! Saga steps and the saga builder.

use common::{BranchId, Gid};
use serde::Serialize;

use crate::error::{Result, SagaError};
use crate::state::SagaState;

/// One forward action paired with its compensation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SagaStep {
    pub name: String,
    pub action: String,
    pub compensate: String,
    pub payload: serde_json::Value,
}

impl SagaStep {
    /// Creates a step whose payload is the JSON form of `payload`.
    pub fn new(
        name: impl Into<String>,
        action: impl Into<String>,
        compensate: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            action: action.into(),
            compensate: compensate.into(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// An ordered, non-empty list of steps under one gid.
///
/// Steps are fixed once the saga is built; only the state moves afterwards.
#[derive(Debug, Clone)]
pub struct Saga {
    gid: Gid,
    steps: Vec<SagaStep>,
    state: SagaState,
}

impl Saga {
    /// Starts a builder for a saga under `gid`.
    pub fn builder(gid: Gid) -> SagaBuilder {
        SagaBuilder {
            gid,
            steps: Vec::new(),
        }
    }

    pub fn gid(&self) -> &Gid {
        &self.gid
    }

    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Branch id the coordinator assigns to the step at `index`.
    pub fn branch_id(index: usize) -> BranchId {
        BranchId::for_step(index)
    }

    /// Moves the saga to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: SagaState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SagaError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(gid = %self.gid, from = %self.state, to = %next, "saga state changed");
        self.state = next;
        Ok(())
    }
}

/// Builder for [`Saga`].
#[derive(Debug)]
pub struct SagaBuilder {
    gid: Gid,
    steps: Vec<SagaStep>,
}

impl SagaBuilder {
    /// Appends a step.
    pub fn step(mut self, step: SagaStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a step built from its parts.
    pub fn add(
        self,
        name: impl Into<String>,
        action: impl Into<String>,
        compensate: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self> {
        Ok(self.step(SagaStep::new(name, action, compensate, payload)?))
    }

    /// Finishes the saga. Fails if no step was added.
    pub fn build(self) -> Result<Saga> {
        if self.steps.is_empty() {
            return Err(SagaError::EmptySaga);
        }
        Ok(Saga {
            gid: self.gid,
            steps: self.steps,
            state: SagaState::Built,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_step_saga() -> Saga {
        Saga::builder(Gid::parse("g1").unwrap())
            .add("first", "http://p/a", "http://p/a-compensate", &json!({"n": 1}))
            .unwrap()
            .add("second", "http://p/b", "http://p/b-compensate", &json!({"n": 2}))
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_keeps_step_order() {
        let saga = two_step_saga();
        assert_eq!(saga.state(), SagaState::Built);
        let names: Vec<_> = saga.steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(saga.steps()[1].payload["n"], 2);
        assert_eq!(Saga::branch_id(1).as_str(), "02");
    }

    #[test]
    fn test_empty_saga_is_rejected() {
        let result = Saga::builder(Gid::new()).build();
        assert!(matches!(result, Err(SagaError::EmptySaga)));
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut saga = two_step_saga();
        saga.transition(SagaState::Submitted).unwrap();
        let err = saga.transition(SagaState::Committed).unwrap_err();
        assert!(matches!(
            err,
            SagaError::InvalidTransition {
                from: SagaState::Submitted,
                to: SagaState::Committed
            }
        ));
        assert_eq!(saga.state(), SagaState::Submitted);
    }
}
