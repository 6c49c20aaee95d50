// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The migration engine's single tagged error type.

use thiserror::Error;

use crate::ids::TypeId;

/// One error kind per `spec.md` §7. Every component operation returns either
/// success or exactly one of these variants; the engine maps any variant
/// surfaced before `Commit` to a rollback attempt.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Plan validation failed (duplicate source/target, bad common
    /// supertype, cycle, or a missing/empty plan at preflight).
    #[error("plan invalid: {reason}")]
    PlanInvalid {
        /// Human-readable validation failure.
        reason: String,
    },
    /// The checkpoint controller could not create a checkpoint.
    #[error("checkpoint failed: {0}")]
    CheckpointFailed(String),
    /// Mutation freeze could not engage within the configured timeout.
    #[error("freeze failed: {0}")]
    FreezeFailed(String),
    /// The heap walk returned unsupported, errored, or timed out.
    #[error("snapshot failed for type {type_name}: {reason}")]
    SnapshotFailed {
        /// Old type being snapshotted.
        type_name: &'static str,
        /// Failure detail.
        reason: String,
    },
    /// A transformer's `migrate` call failed.
    #[error("transform failed for type {type_name} instance: {reason}")]
    TransformFailed {
        /// Old type whose transformer failed.
        type_name: &'static str,
        /// Failure detail.
        reason: String,
    },
    /// Reference rewiring failed (read-only slot, collection rebuild error).
    #[error("rewrite failed for type {type_name}: {cause}")]
    RewriteFailed {
        /// Old type being rewritten.
        type_name: &'static str,
        /// Failure detail.
        cause: String,
    },
    /// A smoke predicate returned false or failed.
    #[error("smoke test failed: {name}: {cause}")]
    SmokeFailed {
        /// Predicate name.
        name: String,
        /// Failure detail.
        cause: String,
    },
    /// `restoreFromCheckpoint` returned instead of replacing the process.
    #[error("restore did not occur")]
    RestoreDidNotOccur,
    /// The checkpoint controller cannot restore at all.
    #[error("restore unsupported")]
    RestoreUnsupported,
}

impl MigrationError {
    /// Short machine-readable kind tag, used in event payloads (`cause.kind`).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlanInvalid { .. } => "PlanInvalid",
            Self::CheckpointFailed(_) => "CheckpointFailed",
            Self::FreezeFailed(_) => "FreezeFailed",
            Self::SnapshotFailed { .. } => "SnapshotFailed",
            Self::TransformFailed { .. } => "TransformFailed",
            Self::RewriteFailed { .. } => "RewriteFailed",
            Self::SmokeFailed { .. } => "SmokeFailed",
            Self::RestoreDidNotOccur => "RestoreDidNotOccur",
            Self::RestoreUnsupported => "RestoreUnsupported",
        }
    }

    pub(crate) fn plan_invalid(reason: impl Into<String>) -> Self {
        Self::PlanInvalid {
            reason: reason.into(),
        }
    }

    pub(crate) fn rewrite_failed(type_id: TypeId, cause: impl Into<String>) -> Self {
        Self::RewriteFailed {
            type_name: type_id.name(),
            cause: cause.into(),
        }
    }
}
