//! Client for an external DTM saga server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coordinator::{Coordinator, CoordinatorError};
use crate::state::SagaOutcome;
use crate::step::Saga;

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    gid: &'a str,
    trans_type: &'static str,
    steps: Vec<BranchUrls<'a>>,
    payloads: Vec<String>,
    wait_result: bool,
}

#[derive(Debug, Serialize)]
struct BranchUrls<'a> {
    action: &'a str,
    compensate: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    dtm_result: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Submits sagas to a DTM server (`POST {server}/submit`) and waits for the
/// result.
///
/// The timeout lives on the `reqwest::Client` handed in at construction.
#[derive(Clone)]
pub struct DtmCoordinator {
    client: reqwest::Client,
    server: String,
}

impl DtmCoordinator {
    /// `server` is the DTM API root, e.g. `http://localhost:36789/api/dtmsvr`.
    pub fn new(client: reqwest::Client, server: impl Into<String>) -> Self {
        Self {
            client,
            server: server.into().trim_end_matches('/').to_string(),
        }
    }

    fn submit_body(saga: &Saga) -> SubmitRequest<'_> {
        SubmitRequest {
            gid: saga.gid().as_str(),
            trans_type: "saga",
            steps: saga
                .steps()
                .iter()
                .map(|s| BranchUrls {
                    action: &s.action,
                    compensate: &s.compensate,
                })
                .collect(),
            payloads: saga.steps().iter().map(|s| s.payload.to_string()).collect(),
            wait_result: true,
        }
    }
}

#[async_trait]
impl Coordinator for DtmCoordinator {
    #[tracing::instrument(skip(self, saga), fields(gid = %saga.gid(), server = %self.server))]
    async fn submit(&self, saga: &Saga) -> Result<SagaOutcome, CoordinatorError> {
        let response = self
            .client
            .post(format!("{}/submit", self.server))
            .json(&Self::submit_body(saga))
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CoordinatorError::Transport(e.to_string()))?;

        tracing::debug!(status, %body, "coordinator answered");
        interpret_submit_reply(status, &body)
    }
}

fn classify_send_error(err: reqwest::Error) -> CoordinatorError {
    if err.is_timeout() {
        CoordinatorError::Timeout
    } else if err.is_connect() {
        CoordinatorError::Unreachable(err.to_string())
    } else {
        CoordinatorError::Transport(err.to_string())
    }
}

/// Maps the coordinator's answer to a saga outcome.
pub fn interpret_submit_reply(status: u16, body: &str) -> Result<SagaOutcome, CoordinatorError> {
    let reply: SubmitResponse = serde_json::from_str(body).unwrap_or_default();
    let message = reply.message.unwrap_or_else(|| body.to_string());

    match (status, reply.dtm_result.as_deref()) {
        (409, _) | (200..=299, Some("FAILURE")) => Ok(SagaOutcome::Compensated {
            failed_step: None,
            reason: message,
        }),
        (425, _) | (200..=299, Some("ONGOING")) => Ok(SagaOutcome::Indeterminate {
            reason: format!("saga still running: {message}"),
        }),
        (200..=299, _) => Ok(SagaOutcome::Committed),
        (400..=499, _) => Err(CoordinatorError::Rejected { status, message }),
        (status, _) => Err(CoordinatorError::Transport(format!(
            "coordinator returned {status}: {message}"
        ))),
    }
}
