//! Shared types for the saga participants: transaction identifiers and the
//! reply body the coordinator reads.

pub mod reply;
pub mod types;

pub use reply::{ParticipantReply, TransResult};
pub use types::{BranchId, BranchKey, BranchOp, Gid, IdError, MAX_BRANCH_ID_LEN, MAX_GID_LEN};
