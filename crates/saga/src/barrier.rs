//! Branch barrier: the idempotency and ordering guard every participant
//! handler runs through.
//!
//! Markers are keyed by (gid, branch, op):
//!
//! - forward action: `pending` while the effect runs, `applied` afterwards,
//!   removed again if the effect failed without writing anything. After an
//!   ambiguous storage error the marker stays `pending`, so redeliveries and
//!   the compensation report in-flight instead of applying twice;
//! - compensation: its own `pending`/`applied` marker, plus a `voided`
//!   marker written on the action key when the action never ran, which makes
//!   a late action a no-op.

use std::future::Future;
use std::sync::Arc;

use common::{BranchKey, BranchOp};
use store::{BarrierStatus, BarrierStore, InsertOutcome};

use crate::error::ParticipantError;

/// Why a handler skipped its effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The same branch already completed.
    Duplicate,
    /// The action arrived after its compensation.
    Hanging,
    /// The compensation arrived before (or instead of) its action.
    NullCompensation,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::Hanging => "hanging",
            SkipReason::NullCompensation => "null_compensation",
        }
    }
}

/// Result of running an effect through the barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    /// The effect ran now.
    Applied(T),
    /// The effect was not run; the branch still counts as successful.
    Skipped(SkipReason),
}

/// Guards participant effects against redelivery and reordering.
#[derive(Clone)]
pub struct BranchBarrier {
    store: Arc<dyn BarrierStore>,
}

impl BranchBarrier {
    pub fn new(store: Arc<dyn BarrierStore>) -> Self {
        Self { store }
    }

    /// Runs a forward action at most once for `key`.
    pub async fn action<T, F, Fut>(
        &self,
        key: &BranchKey,
        effect: F,
    ) -> Result<Guarded<T>, ParticipantError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ParticipantError>>,
    {
        let key = key.with_op(BranchOp::Action);

        match self.store.try_insert(&key, BarrierStatus::Pending).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::Existing(BarrierStatus::Applied) => {
                return Ok(skip(&key, SkipReason::Duplicate));
            }
            InsertOutcome::Existing(BarrierStatus::Voided) => {
                return Ok(skip(&key, SkipReason::Hanging));
            }
            InsertOutcome::Existing(BarrierStatus::Pending) => {
                return Err(ParticipantError::InFlight(key.to_string()));
            }
        }

        self.run(&key, effect).await
    }

    /// Runs a compensation at most once for `key`, and only if the matching
    /// action was applied.
    pub async fn compensation<T, F, Fut>(
        &self,
        key: &BranchKey,
        effect: F,
    ) -> Result<Guarded<T>, ParticipantError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ParticipantError>>,
    {
        let own = key.with_op(BranchOp::Compensate);
        let action = key.with_op(BranchOp::Action);

        match self.store.try_insert(&own, BarrierStatus::Pending).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::Existing(BarrierStatus::Pending) => {
                return Err(ParticipantError::InFlight(own.to_string()));
            }
            InsertOutcome::Existing(_) => return Ok(skip(&own, SkipReason::Duplicate)),
        }

        match self.store.try_insert(&action, BarrierStatus::Voided).await? {
            InsertOutcome::Inserted | InsertOutcome::Existing(BarrierStatus::Voided) => {
                self.store.mark_applied(&own).await?;
                Ok(skip(&own, SkipReason::NullCompensation))
            }
            InsertOutcome::Existing(BarrierStatus::Pending) => {
                self.store.remove_pending(&own).await?;
                Err(ParticipantError::InFlight(action.to_string()))
            }
            InsertOutcome::Existing(BarrierStatus::Applied) => self.run(&own, effect).await,
        }
    }

    async fn run<T, F, Fut>(&self, key: &BranchKey, effect: F) -> Result<Guarded<T>, ParticipantError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ParticipantError>>,
    {
        match effect().await {
            Ok(value) => {
                self.store.mark_applied(key).await?;
                Ok(Guarded::Applied(value))
            }
            Err(err) if err.leaves_no_effect() => {
                if let Err(cleanup) = self.store.remove_pending(key).await {
                    tracing::error!(branch = %key, error = %cleanup, "failed to clear barrier marker");
                }
                Err(err)
            }
            Err(err) => {
                tracing::error!(branch = %key, error = %err, "effect outcome unknown, marker left pending");
                Err(err)
            }
        }
    }
}

fn skip<T>(key: &BranchKey, reason: SkipReason) -> Guarded<T> {
    metrics::counter!("barrier_skips_total", "reason" => reason.as_str()).increment(1);
    tracing::info!(branch = %key, reason = reason.as_str(), "branch effect skipped");
    Guarded::Skipped(reason)
}
