//! Coordinator clients.
//!
//! A [`Coordinator`] drives a submitted saga to its end: forward actions in
//! order, compensations of completed steps in reverse on failure. Two
//! implementations exist: [`crate::dtm::DtmCoordinator`] talks to an
//! external DTM server, [`LocalCoordinator`] drives the saga in-process and
//! calls each branch through a [`StepInvoker`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{BranchKey, BranchOp, ParticipantReply, TransResult};
use thiserror::Error;

use crate::state::SagaOutcome;
use crate::step::Saga;

/// Errors returned by a coordinator before an outcome is known.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The coordinator refused the saga; nothing was applied.
    #[error("Coordinator rejected the saga ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never reached the coordinator.
    #[error("Coordinator unreachable: {0}")]
    Unreachable(String),

    /// No answer within the client timeout.
    #[error("Coordinator timed out")]
    Timeout,

    /// The request was sent but the exchange failed.
    #[error("Coordinator transport error: {0}")]
    Transport(String),
}

/// A saga coordinator.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Submits `saga` and waits for its final outcome.
    async fn submit(&self, saga: &Saga) -> Result<SagaOutcome, CoordinatorError>;
}

/// Errors raised when a branch call gets no usable reply.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Participant returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Calls one participant endpoint on behalf of a coordinator.
#[async_trait]
pub trait StepInvoker: Send + Sync {
    async fn invoke(
        &self,
        url: &str,
        key: &BranchKey,
        payload: &serde_json::Value,
    ) -> Result<ParticipantReply, InvokeError>;
}

/// Calls participants over HTTP the way a DTM server does: `POST` with the
/// step payload as JSON body and the branch identity as query parameters.
#[derive(Clone)]
pub struct HttpStepInvoker {
    client: reqwest::Client,
}

impl HttpStepInvoker {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StepInvoker for HttpStepInvoker {
    async fn invoke(
        &self,
        url: &str,
        key: &BranchKey,
        payload: &serde_json::Value,
    ) -> Result<ParticipantReply, InvokeError> {
        let response = self
            .client
            .post(url)
            .query(&[
                ("gid", key.gid.as_str()),
                ("trans_type", "saga"),
                ("branch_id", key.branch_id.as_str()),
                ("op", key.op.as_str()),
            ])
            .json(payload)
            .send()
            .await
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        interpret_branch_reply(status, &body)
    }
}

/// Maps a participant HTTP response onto a reply.
///
/// A `dtm_result` in the body wins for any status below 500; without one the
/// status code decides. 5xx is an error so the branch is retried.
pub fn interpret_branch_reply(status: u16, body: &str) -> Result<ParticipantReply, InvokeError> {
    let parsed = serde_json::from_str::<ParticipantReply>(body).ok();
    match (status, parsed) {
        (s, Some(reply)) if s < 500 => Ok(reply),
        (409, None) => Ok(ParticipantReply::failure("conflict", body)),
        (425, None) => Ok(ParticipantReply::ongoing(body)),
        (200..=299, None) => Ok(ParticipantReply::success(body)),
        (400..=499, None) => Ok(ParticipantReply::failure("rejected", body)),
        (status, _) => Err(InvokeError::Status {
            status,
            body: body.to_string(),
        }),
    }
}

enum BranchResult {
    Succeeded,
    Failed(String),
    Unknown(String),
}

/// In-process saga driver for single-node deployments.
///
/// Unsettled branches (`ONGOING` or no reply) are retried with a linear
/// back-off. A forward step that never settles is treated as failed but its
/// compensation is still sent, since it may have been applied. A compensation
/// that never settles makes the outcome indeterminate.
pub struct LocalCoordinator {
    invoker: Arc<dyn StepInvoker>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl LocalCoordinator {
    /// Creates a coordinator with 3 attempts per branch and a 200ms base delay.
    pub fn new(invoker: Arc<dyn StepInvoker>) -> Self {
        Self {
            invoker,
            max_attempts: 3,
            retry_delay: Duration::from_millis(200),
        }
    }

    /// Overrides the retry policy.
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    async fn call_branch(
        &self,
        url: &str,
        key: &BranchKey,
        payload: &serde_json::Value,
    ) -> BranchResult {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.invoker.invoke(url, key, payload).await {
                Ok(reply) => match reply.dtm_result {
                    TransResult::Success => return BranchResult::Succeeded,
                    TransResult::Failure => {
                        let reason = match reply.reason {
                            Some(reason) => format!("{reason}: {}", reply.message),
                            None => reply.message,
                        };
                        return BranchResult::Failed(reason);
                    }
                    TransResult::Ongoing => last_error = reply.message,
                },
                Err(e) => last_error = e.to_string(),
            }

            tracing::warn!(branch = %key, attempt, error = %last_error, "branch not settled");
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
        }

        BranchResult::Unknown(last_error)
    }
}

#[async_trait]
impl Coordinator for LocalCoordinator {
    #[tracing::instrument(skip(self, saga), fields(gid = %saga.gid()))]
    async fn submit(&self, saga: &Saga) -> Result<SagaOutcome, CoordinatorError> {
        let mut completed = Vec::new();
        let mut failure = None;

        for (index, step) in saga.steps().iter().enumerate() {
            let key = BranchKey::new(saga.gid().clone(), Saga::branch_id(index), BranchOp::Action);
            tracing::info!(step = %step.name, branch_id = %key.branch_id, "saga step started");

            match self.call_branch(&step.action, &key, &step.payload).await {
                BranchResult::Succeeded => completed.push(index),
                BranchResult::Failed(reason) => {
                    failure = Some((index, reason, false));
                    break;
                }
                BranchResult::Unknown(reason) => {
                    failure = Some((index, reason, true));
                    break;
                }
            }
        }

        let Some((failed_index, reason, unsettled)) = failure else {
            return Ok(SagaOutcome::Committed);
        };

        let failed_step = saga.steps()[failed_index].name.clone();
        tracing::warn!(step = %failed_step, %reason, "saga step failed, compensating");

        let mut pending = Vec::with_capacity(completed.len() + 1);
        if unsettled {
            pending.push(failed_index);
        }
        pending.extend(completed.into_iter().rev());

        for index in pending {
            let step = &saga.steps()[index];
            let key = BranchKey::new(
                saga.gid().clone(),
                Saga::branch_id(index),
                BranchOp::Compensate,
            );
            tracing::info!(step = %step.name, branch_id = %key.branch_id, "compensation started");

            match self.call_branch(&step.compensate, &key, &step.payload).await {
                BranchResult::Succeeded => {}
                BranchResult::Failed(why) | BranchResult::Unknown(why) => {
                    tracing::error!(step = %step.name, error = %why, "compensation did not complete");
                    return Ok(SagaOutcome::Indeterminate {
                        reason: format!("compensation of {} did not complete: {why}", step.name),
                    });
                }
            }
        }

        Ok(SagaOutcome::Compensated {
            failed_step: Some(failed_step),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use common::Gid;
    use serde_json::json;

    /// Replies from a script keyed by "url/op"; unscripted calls succeed.
    #[derive(Default)]
    struct ScriptedInvoker {
        script: Mutex<Vec<(String, Result<ParticipantReply, InvokeError>)>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedInvoker {
        fn on(self, call: &str, reply: Result<ParticipantReply, InvokeError>) -> Self {
            self.script.lock().unwrap().push((call.to_string(), reply));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StepInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            url: &str,
            key: &BranchKey,
            _payload: &serde_json::Value,
        ) -> Result<ParticipantReply, InvokeError> {
            let call = format!("{url}/{}", key.op);
            self.calls.lock().unwrap().push(call.clone());
            let mut script = self.script.lock().unwrap();
            match script.iter().position(|(c, _)| *c == call) {
                Some(pos) => script.remove(pos).1,
                None => Ok(ParticipantReply::success("ok")),
            }
        }
    }

    fn saga() -> Saga {
        Saga::builder(Gid::parse("g1").unwrap())
            .add("a", "a", "a-c", &json!({}))
            .unwrap()
            .add("b", "b", "b-c", &json!({}))
            .unwrap()
            .add("c", "c", "c-c", &json!({}))
            .unwrap()
            .build()
            .unwrap()
    }

    fn coordinator(invoker: Arc<ScriptedInvoker>) -> LocalCoordinator {
        LocalCoordinator::new(invoker).with_retry(2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn runs_steps_in_order() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let outcome = coordinator(invoker.clone()).submit(&saga()).await.unwrap();

        assert_eq!(outcome, SagaOutcome::Committed);
        assert_eq!(invoker.calls(), ["a/action", "b/action", "c/action"]);
    }

    #[tokio::test]
    async fn compensates_completed_steps_in_reverse() {
        let invoker = Arc::new(ScriptedInvoker::default().on(
            "c/action",
            Ok(ParticipantReply::failure("insufficient_stock", "no stock")),
        ));
        let outcome = coordinator(invoker.clone()).submit(&saga()).await.unwrap();

        assert_eq!(
            outcome,
            SagaOutcome::Compensated {
                failed_step: Some("c".to_string()),
                reason: "insufficient_stock: no stock".to_string(),
            }
        );
        assert_eq!(
            invoker.calls(),
            ["a/action", "b/action", "c/action", "b-c/compensate", "a-c/compensate"]
        );
    }

    #[tokio::test]
    async fn unsettled_step_is_compensated_too() {
        let invoker = Arc::new(
            ScriptedInvoker::default()
                .on("b/action", Err(InvokeError::Transport("reset".to_string())))
                .on("b/action", Ok(ParticipantReply::ongoing("busy"))),
        );
        let outcome = coordinator(invoker.clone()).submit(&saga()).await.unwrap();

        assert!(matches!(outcome, SagaOutcome::Compensated { .. }));
        assert_eq!(
            invoker.calls(),
            ["a/action", "b/action", "b/action", "b-c/compensate", "a-c/compensate"]
        );
    }

    #[tokio::test]
    async fn retry_recovers_ongoing_branch() {
        let invoker = Arc::new(
            ScriptedInvoker::default().on("a/action", Ok(ParticipantReply::ongoing("busy"))),
        );
        let outcome = coordinator(invoker.clone()).submit(&saga()).await.unwrap();

        assert_eq!(outcome, SagaOutcome::Committed);
        assert_eq!(invoker.calls().len(), 4);
    }

    #[tokio::test]
    async fn stuck_compensation_is_indeterminate() {
        let invoker = Arc::new(
            ScriptedInvoker::default()
                .on("b/action", Ok(ParticipantReply::failure("x", "boom")))
                .on("a-c/compensate", Err(InvokeError::Transport("down".to_string())))
                .on("a-c/compensate", Err(InvokeError::Transport("down".to_string()))),
        );
        let outcome = coordinator(invoker).submit(&saga()).await.unwrap();

        assert!(matches!(outcome, SagaOutcome::Indeterminate { .. }));
    }

    #[test]
    fn interprets_participant_replies() {
        let reply = interpret_branch_reply(409, r#"{"dtm_result":"FAILURE","message":"no"}"#)
            .unwrap();
        assert_eq!(reply.dtm_result, TransResult::Failure);

        let reply = interpret_branch_reply(425, "").unwrap();
        assert_eq!(reply.dtm_result, TransResult::Ongoing);

        let reply = interpret_branch_reply(200, "ok").unwrap();
        assert_eq!(reply.dtm_result, TransResult::Success);

        let err = interpret_branch_reply(500, r#"{"dtm_result":"ONGOING","message":"db"}"#);
        assert!(matches!(err, Err(InvokeError::Status { status: 500, .. })));
    }
}
