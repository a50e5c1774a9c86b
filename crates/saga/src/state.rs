//! Saga state machine and outcome.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Built ──► Submitted ──► Executing ──┬──► Committed
///   │           │                     └──► Compensating ──► Compensated
///   └───────────┴──► Indeterminate
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SagaState {
    /// Steps assembled, nothing sent yet.
    #[default]
    Built,

    /// The coordinator accepted the saga.
    Submitted,

    /// Forward actions are running.
    Executing,

    /// A step failed and compensating actions are running.
    Compensating,

    /// All forward actions succeeded (terminal state).
    Committed,

    /// Every completed step was compensated (terminal state).
    Compensated,

    /// The final result is unknown and needs reconciliation (terminal state).
    Indeterminate,
}

impl SagaState {
    /// Returns true if the saga may move from this state to `next`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, next),
            (Built, Submitted)
                | (Built, Indeterminate)
                | (Submitted, Executing)
                | (Submitted, Indeterminate)
                | (Executing, Committed)
                | (Executing, Compensating)
                | (Compensating, Compensated)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Committed | SagaState::Compensated | SagaState::Indeterminate
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Built => "Built",
            SagaState::Submitted => "Submitted",
            SagaState::Executing => "Executing",
            SagaState::Compensating => "Compensating",
            SagaState::Committed => "Committed",
            SagaState::Compensated => "Compensated",
            SagaState::Indeterminate => "Indeterminate",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final result of a submitted saga, as the caller sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SagaOutcome {
    /// Every forward action was applied.
    Committed,

    /// A step failed and every applied step was undone.
    ///
    /// `failed_step` is `None` when the coordinator does not report which
    /// step failed.
    Compensated {
        failed_step: Option<String>,
        reason: String,
    },

    /// No definite answer; the gid must be reconciled out of band.
    Indeterminate { reason: String },
}

impl SagaOutcome {
    /// Label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SagaOutcome::Committed => "committed",
            SagaOutcome::Compensated { .. } => "compensated",
            SagaOutcome::Indeterminate { .. } => "indeterminate",
        }
    }

    /// The terminal state that corresponds to this outcome.
    pub fn final_state(&self) -> SagaState {
        match self {
            SagaOutcome::Committed => SagaState::Committed,
            SagaOutcome::Compensated { .. } => SagaState::Compensated,
            SagaOutcome::Indeterminate { .. } => SagaState::Indeterminate,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, SagaOutcome::Committed)
    }
}
