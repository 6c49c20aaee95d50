// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Checkpoint/rollback seam (`spec.md` §3, §4.4, §4.6).

use crate::error::MigrationError;

/// Host-provided checkpoint/restore facility.
///
/// The engine treats the checkpoint as opaque: it only knows whether one
/// exists, not how it's represented (a full heap snapshot, a write-ahead
/// log, a VM snapshot, ...). `restore_from_checkpoint` is documented as
/// normally not returning, because a real restore typically replaces the
/// running process image; if it *does* return, the engine treats that as
/// [`MigrationError::RestoreDidNotOccur`].
pub trait CheckpointController: Send + Sync {
    /// Creates a checkpoint of the current process state.
    ///
    /// # Errors
    /// Returns [`MigrationError::CheckpointFailed`] if the checkpoint could
    /// not be created.
    fn checkpoint(&self) -> Result<(), MigrationError>;

    /// Discards the most recent checkpoint after a successful migration.
    ///
    /// Failure here is logged by the engine but does not itself fail the
    /// migration (`spec.md` §4.6): the migration already committed.
    ///
    /// # Errors
    /// Returns an error string describing why the checkpoint could not be
    /// deleted.
    fn delete_checkpoint(&self) -> Result<(), String>;

    /// Restores the process to the most recent checkpoint.
    ///
    /// Conventionally does not return: a real implementation typically
    /// re-execs or otherwise replaces the running process. If it does
    /// return, the engine surfaces [`MigrationError::RestoreDidNotOccur`].
    ///
    /// # Errors
    /// Returns [`MigrationError::RestoreUnsupported`] if this controller
    /// cannot restore at all, or [`MigrationError::RestoreDidNotOccur`] if
    /// the attempt itself failed without restoring.
    fn restore_from_checkpoint(&self) -> Result<(), MigrationError>;
}

/// The default [`CheckpointController`]: accepts checkpoints (as a no-op)
/// but cannot restore.
///
/// Useful for hosts that have their own external checkpointing (a
/// supervisor that snapshots the process, a database transaction) and only
/// want the engine's phase sequencing, not its checkpoint storage.
pub struct NoopCheckpointController;

impl CheckpointController for NoopCheckpointController {
    fn checkpoint(&self) -> Result<(), MigrationError> {
        Ok(())
    }

    fn delete_checkpoint(&self) -> Result<(), String> {
        Ok(())
    }

    fn restore_from_checkpoint(&self) -> Result<(), MigrationError> {
        Err(MigrationError::RestoreUnsupported)
    }
}
