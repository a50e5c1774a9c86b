//! Saga submission.

use std::sync::Arc;

use common::Gid;
use serde::Serialize;

use crate::coordinator::{Coordinator, CoordinatorError};
use crate::error::{Result, SagaError};
use crate::state::{SagaOutcome, SagaState};
use crate::step::Saga;

/// What the caller learns about a submitted saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaReport {
    pub gid: Gid,
    pub state: SagaState,
    #[serde(flatten)]
    pub outcome: SagaOutcome,
}

/// Hands built sagas to the coordinator and maps the answer to an outcome.
#[derive(Clone)]
pub struct SagaSubmitter {
    coordinator: Arc<dyn Coordinator>,
}

impl SagaSubmitter {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Submits `saga` once and waits for its outcome.
    ///
    /// A coordinator rejection is returned as
    /// [`SagaError::CoordinatorRejected`]; every transport problem becomes an
    /// `Indeterminate` outcome carrying the gid for reconciliation.
    #[tracing::instrument(skip(self, saga), fields(gid = %saga.gid(), steps = saga.steps().len()))]
    pub async fn submit(&self, mut saga: Saga) -> Result<SagaReport> {
        metrics::counter!("saga_submissions_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.coordinator.submit(&saga).await;

        let outcome = match result {
            Ok(outcome) => {
                saga.transition(SagaState::Submitted)?;
                match &outcome {
                    SagaOutcome::Committed => {
                        saga.transition(SagaState::Executing)?;
                        saga.transition(SagaState::Committed)?;
                    }
                    SagaOutcome::Compensated { .. } => {
                        saga.transition(SagaState::Executing)?;
                        saga.transition(SagaState::Compensating)?;
                        saga.transition(SagaState::Compensated)?;
                    }
                    SagaOutcome::Indeterminate { .. } => {
                        saga.transition(SagaState::Indeterminate)?;
                    }
                }
                outcome
            }
            Err(CoordinatorError::Rejected { status, message }) => {
                metrics::counter!("saga_outcomes_total", "outcome" => "rejected").increment(1);
                tracing::warn!(status, %message, "coordinator rejected saga");
                return Err(SagaError::CoordinatorRejected { status, message });
            }
            Err(CoordinatorError::Unreachable(reason)) => {
                saga.transition(SagaState::Indeterminate)?;
                SagaOutcome::Indeterminate {
                    reason: format!("coordinator unreachable: {reason}"),
                }
            }
            Err(err @ (CoordinatorError::Timeout | CoordinatorError::Transport(_))) => {
                saga.transition(SagaState::Submitted)?;
                saga.transition(SagaState::Indeterminate)?;
                SagaOutcome::Indeterminate {
                    reason: err.to_string(),
                }
            }
        };

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_submit_duration_seconds").record(duration);
        metrics::counter!("saga_outcomes_total", "outcome" => outcome.label()).increment(1);

        match &outcome {
            SagaOutcome::Committed => tracing::info!(duration, "saga committed"),
            SagaOutcome::Compensated {
                failed_step,
                reason,
            } => tracing::warn!(?failed_step, %reason, duration, "saga compensated"),
            SagaOutcome::Indeterminate { reason } => {
                tracing::error!(%reason, duration, "saga outcome indeterminate")
            }
        }

        Ok(SagaReport {
            gid: saga.gid().clone(),
            state: saga.state(),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct FixedCoordinator(Mutex<Option<std::result::Result<SagaOutcome, CoordinatorError>>>);

    impl FixedCoordinator {
        fn new(result: std::result::Result<SagaOutcome, CoordinatorError>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(Some(result))))
        }
    }

    #[async_trait]
    impl Coordinator for FixedCoordinator {
        async fn submit(
            &self,
            _saga: &Saga,
        ) -> std::result::Result<SagaOutcome, CoordinatorError> {
            self.0.lock().unwrap().take().unwrap()
        }
    }

    fn saga() -> Saga {
        Saga::builder(Gid::parse("g1").unwrap())
            .add("only", "http://p/a", "http://p/a-c", &json!({}))
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn committed_saga_reaches_committed_state() {
        let submitter = SagaSubmitter::new(FixedCoordinator::new(Ok(SagaOutcome::Committed)));
        let report = submitter.submit(saga()).await.unwrap();

        assert_eq!(report.gid.as_str(), "g1");
        assert_eq!(report.state, SagaState::Committed);
        assert!(report.outcome.is_committed());
    }

    #[tokio::test]
    async fn compensated_saga_reaches_compensated_state() {
        let submitter = SagaSubmitter::new(FixedCoordinator::new(Ok(SagaOutcome::Compensated {
            failed_step: Some("only".to_string()),
            reason: "no stock".to_string(),
        })));
        let report = submitter.submit(saga()).await.unwrap();
        assert_eq!(report.state, SagaState::Compensated);
    }

    #[tokio::test]
    async fn timeout_is_indeterminate() {
        let submitter = SagaSubmitter::new(FixedCoordinator::new(Err(CoordinatorError::Timeout)));
        let report = submitter.submit(saga()).await.unwrap();

        assert_eq!(report.state, SagaState::Indeterminate);
        assert!(matches!(report.outcome, SagaOutcome::Indeterminate { .. }));
    }

    #[tokio::test]
    async fn unreachable_coordinator_is_indeterminate() {
        let submitter = SagaSubmitter::new(FixedCoordinator::new(Err(
            CoordinatorError::Unreachable("connection refused".to_string()),
        )));
        let report = submitter.submit(saga()).await.unwrap();
        assert_eq!(report.state, SagaState::Indeterminate);
    }

    #[tokio::test]
    async fn rejection_is_an_error() {
        let submitter = SagaSubmitter::new(FixedCoordinator::new(Err(
            CoordinatorError::Rejected {
                status: 422,
                message: "bad saga".to_string(),
            },
        )));
        let err = submitter.submit(saga()).await.unwrap_err();
        assert!(matches!(
            err,
            SagaError::CoordinatorRejected { status: 422, .. }
        ));
    }

    #[test]
    fn report_serializes_flat() {
        let report = SagaReport {
            gid: Gid::parse("g1").unwrap(),
            state: SagaState::Committed,
            outcome: SagaOutcome::Committed,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["gid"], "g1");
        assert_eq!(json["outcome"], "committed");
    }
}
