// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Migration phase state machine (`spec.md` §3, §4.7).

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

use crate::ids::MigrationId;

/// A state of the [`crate::engine::MigrationEngine`]'s run.
///
/// Transitions follow `spec.md` §4.7: `Idle -> Preflight -> Checkpointing ->
/// Frozen -> Snapshot -> Rewrite -> SmokeTest -> Commit -> Done`, with any
/// failure from `Frozen` onward routing to `Rollback` and then `Failed`; a
/// failure at `Preflight` or `Checkpointing` routes directly to `Failed`
/// (nothing has been frozen yet, so there is nothing to roll back).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// No migration in progress.
    Idle,
    /// Validating the plan and computing the touched-type set.
    Preflight,
    /// Requesting a checkpoint from the [`crate::checkpoint::CheckpointController`].
    Checkpointing,
    /// Mutation frozen; the critical section has begun.
    Frozen,
    /// Capturing the per-type [`crate::heap_walker::HeapSnapshot`].
    Snapshot,
    /// Running transformers and rewiring references.
    Rewrite,
    /// Running the registered smoke tests.
    SmokeTest,
    /// Deleting the checkpoint and unfreezing.
    Commit,
    /// Restoring from the checkpoint after a failure in or after `Frozen`.
    Rollback,
    /// Migration finished, successfully or via a completed rollback.
    Done,
    /// Migration finished unsuccessfully and could not be rolled back, or
    /// failed before any checkpoint existed.
    Failed,
}

impl Phase {
    /// True for the phases inside the mutation-frozen critical section
    /// (`spec.md` §4.7): failures here trigger rollback rather than a bare
    /// failure.
    #[must_use]
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            Phase::Frozen | Phase::Snapshot | Phase::Rewrite | Phase::SmokeTest
        )
    }
}

/// Hooks invoked around each critical phase transition (`spec.md` §6).
///
/// Default implementations are no-ops, matching the spec's "optional
/// listener" framing. An exception from `on_before_critical_phase` aborts
/// the migration before the phase runs; one from `on_after_critical_phase`
/// is logged and swallowed, since the phase has already completed.
pub trait PhaseListener: Send + Sync {
    /// Called immediately before entering a critical `phase`.
    ///
    /// # Errors
    /// Returning `Err` aborts the migration before `phase` begins.
    fn on_before_critical_phase(&self, phase: Phase) -> Result<(), String> {
        let _ = phase;
        Ok(())
    }

    /// Called immediately after a critical `phase` completes successfully.
    /// Errors are logged and otherwise ignored.
    fn on_after_critical_phase(&self, phase: Phase) {
        let _ = phase;
    }
}

/// The default [`PhaseListener`]: observes nothing.
pub struct NoopPhaseListener;

impl PhaseListener for NoopPhaseListener {}

/// How a completed migration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Reached `Commit` with no failures.
    Committed,
    /// Failed after `Frozen` and successfully rolled back.
    RolledBack,
    /// Failed before freezing, or rollback itself failed.
    Failed,
}

/// A record of one completed migration attempt, kept in
/// [`MigrationHistory`]'s bounded ring buffer.
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    /// The migration's identity.
    pub id: MigrationId,
    /// Monotonic start timestamp, nanoseconds since an arbitrary epoch.
    pub started_at_nanos: u128,
    /// Monotonic end timestamp, nanoseconds since the same epoch.
    pub ended_at_nanos: u128,
    /// How it ended.
    pub outcome: Outcome,
    /// The failure's display text, if `outcome != Committed`.
    pub failure_cause: Option<String>,
}

/// Bounded, thread-safe ring buffer of [`MigrationRecord`]s
/// (`history.size` in `spec.md` §6, default 10).
pub struct MigrationHistory {
    capacity: usize,
    records: Mutex<VecDeque<MigrationRecord>>,
}

impl MigrationHistory {
    /// Default ring buffer size when `history.size` is unset.
    pub const DEFAULT_CAPACITY: usize = 10;

    /// Builds an empty history with room for `capacity` records. `capacity
    /// == 0` degenerates to a history that retains nothing.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends `record`, evicting the oldest entry if the buffer is full.
    pub fn push(&self, record: MigrationRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Snapshots the current history, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MigrationRecord> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for MigrationHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
