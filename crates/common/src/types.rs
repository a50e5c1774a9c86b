use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest gid a participant accepts.
pub const MAX_GID_LEN: usize = 128;

/// Longest branch id a participant accepts.
pub const MAX_BRANCH_ID_LEN: usize = 16;

/// Rejected identifier input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("gid must not be empty")]
    EmptyGid,

    #[error("gid is longer than {MAX_GID_LEN} characters")]
    GidTooLong,

    #[error("gid contains invalid character {0:?}")]
    InvalidGidChar(char),

    #[error("branch id must not be empty")]
    EmptyBranchId,

    #[error("branch id is longer than {MAX_BRANCH_ID_LEN} characters")]
    BranchIdTooLong,
}

/// Global transaction identifier correlating every step of one saga.
///
/// Generated once per saga invocation and never reused. Participants receive
/// it from the coordinator on every callback, so parsing is strict: only
/// ASCII alphanumerics, `-` and `_` are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(String);

impl Gid {
    /// Creates a new random gid.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parses a gid received from the coordinator.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if raw.is_empty() {
            return Err(IdError::EmptyGid);
        }
        if raw.len() > MAX_GID_LEN {
            return Err(IdError::GidTooLong);
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(IdError::InvalidGidChar(c));
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the gid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Gid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Gid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a step inside its saga, as the coordinator numbers it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(String);

impl BranchId {
    /// Branch id for the step at `index` (zero-based): `"01"`, `"02"`, ...
    pub fn for_step(index: usize) -> Self {
        Self(format!("{:02}", index + 1))
    }

    /// Parses a branch id received from the coordinator.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if raw.is_empty() {
            return Err(IdError::EmptyBranchId);
        }
        if raw.len() > MAX_BRANCH_ID_LEN {
            return Err(IdError::BranchIdTooLong);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which half of a step a callback executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchOp {
    Action,
    Compensate,
}

impl BranchOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchOp::Action => "action",
            BranchOp::Compensate => "compensate",
        }
    }
}

impl std::fmt::Display for BranchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Idempotency key of one callback: gid + branch + op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchKey {
    pub gid: Gid,
    pub branch_id: BranchId,
    pub op: BranchOp,
}

impl BranchKey {
    pub fn new(gid: Gid, branch_id: BranchId, op: BranchOp) -> Self {
        Self { gid, branch_id, op }
    }

    /// The same branch with the other operation.
    pub fn with_op(&self, op: BranchOp) -> Self {
        Self {
            gid: self.gid.clone(),
            branch_id: self.branch_id.clone(),
            op,
        }
    }

    /// Durable key stored on records created by this branch.
    ///
    /// Identical for the action and its compensation, so a compensation can
    /// find what its action created.
    pub fn correlation_key(&self) -> String {
        format!("{}:{}", self.gid, self.branch_id)
    }
}

impl std::fmt::Display for BranchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.gid, self.branch_id, self.op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gid_new_creates_unique_ids() {
        let a = Gid::new();
        let b = Gid::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn gid_parse_accepts_generated_ids() {
        let gid = Gid::new();
        assert_eq!(Gid::parse(gid.as_str()).unwrap(), gid);
        assert!(Gid::parse("abc-DEF_123").is_ok());
    }

    #[test]
    fn gid_parse_rejects_bad_input() {
        assert_eq!(Gid::parse(""), Err(IdError::EmptyGid));
        assert_eq!(Gid::parse("a b"), Err(IdError::InvalidGidChar(' ')));
        assert_eq!(
            Gid::parse(&"x".repeat(MAX_GID_LEN + 1)),
            Err(IdError::GidTooLong)
        );
    }

    #[test]
    fn branch_ids_are_two_digit_ordinals() {
        assert_eq!(BranchId::for_step(0).as_str(), "01");
        assert_eq!(BranchId::for_step(9).as_str(), "10");
    }

    #[test]
    fn branch_id_parse_enforces_length() {
        assert_eq!(BranchId::parse(""), Err(IdError::EmptyBranchId));
        assert!(BranchId::parse(&"1".repeat(MAX_BRANCH_ID_LEN)).is_ok());
        assert_eq!(
            BranchId::parse(&"1".repeat(MAX_BRANCH_ID_LEN + 1)),
            Err(IdError::BranchIdTooLong)
        );
    }

    #[test]
    fn correlation_key_ignores_op() {
        let key = BranchKey::new(
            Gid::parse("g1").unwrap(),
            BranchId::for_step(1),
            BranchOp::Action,
        );
        let comp = key.with_op(BranchOp::Compensate);
        assert_eq!(key.correlation_key(), "g1:02");
        assert_eq!(comp.correlation_key(), key.correlation_key());
        assert_eq!(comp.to_string(), "g1/02/compensate");
    }

    #[test]
    fn branch_op_serializes_lowercase() {
        let json = serde_json::to_string(&BranchOp::Compensate).unwrap();
        assert_eq!(json, "\"compensate\"");
    }
}
