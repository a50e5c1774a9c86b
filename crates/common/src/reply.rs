//! Body every participant callback answers with.
//!
//! The coordinator decides how to proceed from `dtm_result`, not from the
//! HTTP status alone, so a business failure such as insufficient stock is
//! distinguishable from a transport error.

use serde::{Deserialize, Serialize};

/// Result indicator understood by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransResult {
    /// Step applied (or already applied); advance.
    Success,
    /// Step failed for a business reason; start or continue compensation.
    Failure,
    /// Step cannot be decided yet; retry later.
    Ongoing,
}

impl TransResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransResult::Success => "SUCCESS",
            TransResult::Failure => "FAILURE",
            TransResult::Ongoing => "ONGOING",
        }
    }
}

impl std::fmt::Display for TransResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantReply {
    pub dtm_result: TransResult,
    #[serde(default)]
    pub message: String,
    /// Machine-readable failure reason, e.g. `insufficient_stock`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ParticipantReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            dtm_result: TransResult::Success,
            message: message.into(),
            reason: None,
            data: None,
        }
    }

    pub fn failure(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            dtm_result: TransResult::Failure,
            message: message.into(),
            reason: Some(reason.into()),
            data: None,
        }
    }

    pub fn ongoing(message: impl Into<String>) -> Self {
        Self {
            dtm_result: TransResult::Ongoing,
            message: message.into(),
            reason: None,
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.dtm_result == TransResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reply_wire_shape() {
        let reply = ParticipantReply::failure("insufficient_stock", "only 2 left");
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["dtm_result"], "FAILURE");
        assert_eq!(json["reason"], "insufficient_stock");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn reply_without_message_still_parses() {
        let reply: ParticipantReply =
            serde_json::from_str(r#"{"dtm_result":"SUCCESS"}"#).unwrap();
        assert!(reply.is_success());
        assert!(reply.message.is_empty());
    }
}
