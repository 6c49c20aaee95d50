// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The migration engine (`spec.md` §3, §4.7).
//!
//! Binds every component and drives the [`Phase`] state machine for a
//! single migration run end to end: `Idle -> Preflight -> Checkpointing ->
//! Frozen -> Snapshot -> Rewrite -> SmokeTest -> Commit -> Done`, with any
//! failure at `Frozen` or later routing through `Rollback`.

use std::sync::{Arc, RwLock};

use crate::checkpoint::{CheckpointController, NoopCheckpointController};
use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::events::EventBus;
use crate::heap_walker::HeapWalker;
use crate::hooks::HookRegistry;
use crate::ids::TypeId;
use crate::migratable::GraphNode;
use crate::phase::{
    MigrationHistory, MigrationRecord, NoopPhaseListener, Outcome, Phase, PhaseListener,
};
use crate::plan::Plan;
use crate::registry::TransformerRegistry;
use crate::rewrite::{ReferenceRewriter, RewriteMap};
use crate::smoke::SmokeTestRunner;
use crate::transformer::TransformerDescriptor;
use crate::config::Config;

/// Drives one migration at a time on whatever thread calls
/// [`MigrationEngine::migrate`] (`spec.md` §5: migrations are not run
/// concurrently with each other).
pub struct MigrationEngine {
    heap_walker: HeapWalker,
    checkpoint: Arc<dyn CheckpointController>,
    smoke: SmokeTestRunner,
    listener: Arc<dyn PhaseListener>,
    hooks: HookRegistry,
    events: EventBus,
    history: MigrationHistory,
    config: Config,
    freeze: RwLock<()>,
}

/// Builds a [`MigrationEngine`] with explicit overrides and sensible
/// defaults for everything else, mirroring the teacher's builder/defaults
/// split for its own engine construction.
pub struct MigrationEngineBuilder {
    heap_walker: HeapWalker,
    checkpoint: Arc<dyn CheckpointController>,
    smoke: SmokeTestRunner,
    listener: Arc<dyn PhaseListener>,
    hooks: HookRegistry,
    config: Config,
}

impl Default for MigrationEngineBuilder {
    fn default() -> Self {
        Self {
            heap_walker: HeapWalker::new(),
            checkpoint: Arc::new(NoopCheckpointController),
            smoke: SmokeTestRunner::new(),
            listener: Arc::new(NoopPhaseListener),
            hooks: HookRegistry::new(),
            config: Config::default(),
        }
    }
}

impl MigrationEngineBuilder {
    /// Starts a builder with every component defaulted:
    /// no roots, a [`NoopCheckpointController`], no smoke tests, a
    /// [`NoopPhaseListener`], no hooks, default [`Config`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an application root for `SPEC`-mode heap walking.
    #[must_use]
    pub fn with_root(mut self, root: Arc<dyn GraphNode>) -> Self {
        self.heap_walker.register_root(root);
        self
    }

    /// Installs a `FULL`-mode [`crate::heap_walker::HeapProbe`].
    #[must_use]
    pub fn with_heap_probe(mut self, probe: Arc<dyn crate::heap_walker::HeapProbe>) -> Self {
        self.heap_walker.set_probe(probe);
        self
    }

    /// Overrides the [`CheckpointController`].
    #[must_use]
    pub fn with_checkpoint_controller(mut self, controller: Arc<dyn CheckpointController>) -> Self {
        self.checkpoint = controller;
        self
    }

    /// Registers a named smoke test, run after every rewrite completes.
    #[must_use]
    pub fn with_smoke_test(mut self, test: Box<dyn crate::smoke::SmokeTest>) -> Self {
        self.smoke.register(test);
        self
    }

    /// Overrides the [`PhaseListener`].
    #[must_use]
    pub fn with_phase_listener(mut self, listener: Arc<dyn PhaseListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Registers an application registry hook for `old_type` (`spec.md` §6).
    #[must_use]
    pub fn with_hook(mut self, old_type: TypeId, hook: Arc<crate::hooks::OnReplaced>) -> Self {
        self.hooks.register(old_type, hook);
        self
    }

    /// Overrides the resolved [`Config`].
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Finishes construction.
    #[must_use]
    pub fn build(self) -> MigrationEngine {
        MigrationEngine {
            heap_walker: self.heap_walker,
            checkpoint: self.checkpoint,
            smoke: self.smoke,
            listener: self.listener,
            hooks: self.hooks,
            events: EventBus::new(self.config.alert_level),
            history: MigrationHistory::new(self.config.history_size),
            config: self.config,
            freeze: RwLock::new(()),
        }
    }
}

impl MigrationEngine {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> MigrationEngineBuilder {
        MigrationEngineBuilder::new()
    }

    /// The bus events are published to; callers subscribe before calling
    /// [`MigrationEngine::migrate`] to observe the run.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The bounded history of past migration attempts.
    #[must_use]
    pub fn history(&self) -> Vec<MigrationRecord> {
        self.history.snapshot()
    }

    /// Runs one migration to completion.
    ///
    /// An empty `plan` is valid and takes the fast path straight to `Done`
    /// with no checkpoint, snapshot, or rewrite work (`spec.md`'s empty-plan
    /// scenario): there is nothing to migrate, so nothing is frozen.
    ///
    /// # Errors
    /// Returns whichever [`MigrationError`] caused the run to fail. If the
    /// failure happened at [`Phase::Frozen`] or later, the engine attempts a
    /// rollback first; the returned error then reflects the restore
    /// attempt's own outcome (`spec.md` §7: errors within `Rollback` are
    /// terminal `Failed`).
    #[allow(clippy::too_many_lines)]
    pub fn migrate(&self, plan: Plan) -> Result<(), MigrationError> {
        let context = MigrationContext::new(Arc::new(plan));
        self.events.migration_started(context.id());

        if context.plan().is_empty() {
            self.events.phase_started(context.id(), Phase::Preflight);
            self.events.phase_completed(context.id(), Phase::Preflight);
            self.history.push(MigrationRecord {
                id: context.id(),
                started_at_nanos: 0,
                ended_at_nanos: context.started_at().elapsed().as_nanos(),
                outcome: Outcome::Committed,
                failure_cause: None,
            });
            self.events.migration_completed(context.id());
            return Ok(());
        }

        if let Err(error) = self.run_preflight(&context) {
            return self.fail_before_freeze(&context, error);
        }

        if let Err(error) = self.run_checkpointing(&context) {
            return self.fail_before_freeze(&context, error);
        }

        let _freeze_guard = match self.freeze.write() {
            Ok(guard) => guard,
            Err(_) => {
                return self.fail_before_freeze(
                    &context,
                    MigrationError::FreezeFailed("freeze lock poisoned".to_string()),
                );
            }
        };

        let outcome = self.run_critical_section(&context);

        match outcome {
            Ok(()) => {
                if let Err(cause) = self.checkpoint.delete_checkpoint() {
                    tracing::warn!(%cause, "checkpoint delete failed after successful migration");
                }
                self.history.push(MigrationRecord {
                    id: context.id(),
                    started_at_nanos: 0,
                    ended_at_nanos: context.started_at().elapsed().as_nanos(),
                    outcome: Outcome::Committed,
                    failure_cause: None,
                });
                self.events.phase_started(context.id(), Phase::Commit);
                self.events.phase_completed(context.id(), Phase::Commit);
                self.events.migration_completed(context.id());
                Ok(())
            }
            Err((phase, error)) => self.rollback(&context, phase, error),
        }
    }

    fn run_preflight(&self, context: &MigrationContext) -> Result<(), MigrationError> {
        self.events.phase_started(context.id(), Phase::Preflight);
        if context.plan().is_empty() {
            return Err(MigrationError::plan_invalid("plan has no descriptors"));
        }
        self.events.phase_completed(context.id(), Phase::Preflight);
        Ok(())
    }

    fn run_checkpointing(&self, context: &MigrationContext) -> Result<(), MigrationError> {
        self.events.phase_started(context.id(), Phase::Checkpointing);
        self.checkpoint.checkpoint()?;
        self.events.phase_completed(context.id(), Phase::Checkpointing);
        Ok(())
    }

    /// Runs `Frozen -> Snapshot -> Rewrite -> SmokeTest`. On failure, returns
    /// the phase it failed in alongside the error, so the caller can attempt
    /// rollback and report which phase provoked it.
    fn run_critical_section(&self, context: &MigrationContext) -> Result<(), (Phase, MigrationError)> {
        self.run_listened_phase(context, Phase::Frozen, || Ok(()))
            .map_err(|error| (Phase::Frozen, error))?;

        let touched_types: Vec<TypeId> = context
            .plan()
            .ordered()
            .map(TransformerDescriptor::source)
            .collect();

        let snapshot = self
            .run_listened_phase(context, Phase::Snapshot, || {
                let snapshot = self
                    .heap_walker
                    .snapshot(&touched_types, self.config.heap_walk_mode, self.config.heap_walk_timeout)
                    .map_err(|cause| MigrationError::SnapshotFailed {
                        type_name: "<heap walk>",
                        reason: cause.to_string(),
                    })?;

                const MIB: u64 = 1024 * 1024;
                let total_bytes = snapshot.total_bytes();
                let total_mib = total_bytes as f64 / MIB as f64;
                if self.config.heap_size_min > 0 && total_bytes < self.config.heap_size_min * MIB {
                    return Err(MigrationError::SnapshotFailed {
                        type_name: "<heap walk>",
                        reason: format!(
                            "heap size {total_mib:.2} MiB below configured minimum {} MiB",
                            self.config.heap_size_min
                        ),
                    });
                }
                if self.config.heap_size_max > 0 && total_bytes > self.config.heap_size_max * MIB {
                    return Err(MigrationError::SnapshotFailed {
                        type_name: "<heap walk>",
                        reason: format!(
                            "heap size {total_mib:.2} MiB above configured maximum {} MiB",
                            self.config.heap_size_max
                        ),
                    });
                }
                Ok(snapshot)
            })
            .map_err(|error| (Phase::Snapshot, error))?;

        let registry = TransformerRegistry::new(Plan::clone(context.plan()));

        self.run_listened_phase(context, Phase::Rewrite, || {
            for descriptor in context.plan().ordered() {
                let old_type = descriptor.source();
                let mut rewrite_map = RewriteMap::new(old_type);
                for old_instance in snapshot.instances_of(old_type) {
                    let replaced = resolve_chain(context.plan(), descriptor, old_instance.clone())?;
                    rewrite_map.insert(old_instance.clone(), replaced);
                }
                ReferenceRewriter::rewrite(self.heap_walker.roots(), &rewrite_map, &self.hooks, &registry)?;
            }
            Ok(())
        })
        .map_err(|error| (Phase::Rewrite, error))?;

        self.run_listened_phase(context, Phase::SmokeTest, || {
            self.smoke.run_all(self.config.smoke_test_timeout)
        })
        .map_err(|error| (Phase::SmokeTest, error))?;

        Ok(())
    }

    /// Runs one critical phase, invoking the [`PhaseListener`] hooks and
    /// publishing `PhaseStarted`/`PhaseCompleted` around it.
    fn run_listened_phase<T>(
        &self,
        context: &MigrationContext,
        phase: Phase,
        body: impl FnOnce() -> Result<T, MigrationError>,
    ) -> Result<T, MigrationError> {
        self.events.phase_started(context.id(), phase);

        if let Err(message) = self.listener.on_before_critical_phase(phase) {
            return Err(listener_abort_error(phase, message));
        }

        let result = body()?;

        self.listener.on_after_critical_phase(phase);
        self.events.phase_completed(context.id(), phase);
        Ok(result)
    }

    fn rollback(
        &self,
        context: &MigrationContext,
        failing_phase: Phase,
        cause: MigrationError,
    ) -> Result<(), MigrationError> {
        self.events.rollback_triggered(context.id(), failing_phase, &cause);
        self.events.phase_started(context.id(), Phase::Rollback);

        // `restore_from_checkpoint` normally never returns: a real controller
        // replaces the running process. Returning `Ok` is itself the failure
        // mode `spec.md` §4.6 calls `RestoreDidNotOccur`; an `Err` is already
        // the terminal cause (`RestoreUnsupported`, or whatever the
        // controller surfaced) and is propagated verbatim, per `spec.md`
        // §7: "errors within Rollback are terminal Failed".
        let final_error = self
            .checkpoint
            .restore_from_checkpoint()
            .err()
            .unwrap_or(MigrationError::RestoreDidNotOccur);

        self.events.rollback_failed(context.id(), &final_error);
        self.history.push(MigrationRecord {
            id: context.id(),
            started_at_nanos: 0,
            ended_at_nanos: context.started_at().elapsed().as_nanos(),
            outcome: Outcome::Failed,
            failure_cause: Some(final_error.to_string()),
        });
        self.events.migration_failed(context.id(), &final_error);
        Err(final_error)
    }

    fn fail_before_freeze(
        &self,
        context: &MigrationContext,
        error: MigrationError,
    ) -> Result<(), MigrationError> {
        self.history.push(MigrationRecord {
            id: context.id(),
            started_at_nanos: 0,
            ended_at_nanos: context.started_at().elapsed().as_nanos(),
            outcome: Outcome::Failed,
            failure_cause: Some(error.to_string()),
        });
        self.events.migration_failed(context.id(), &error);
        Err(error)
    }
}

/// Maps a [`PhaseListener`] abort (which carries only a message, not a typed
/// error) onto the [`MigrationError`] variant the failing phase would
/// otherwise have produced, so the engine's rollback routing stays uniform.
fn listener_abort_error(phase: Phase, message: String) -> MigrationError {
    match phase {
        Phase::Frozen => MigrationError::FreezeFailed(message),
        Phase::Snapshot => MigrationError::SnapshotFailed {
            type_name: "<listener>",
            reason: message,
        },
        Phase::Rewrite => MigrationError::RewriteFailed {
            type_name: "<listener>",
            cause: message,
        },
        Phase::SmokeTest => MigrationError::SmokeFailed {
            name: "<listener>".to_string(),
            cause: message,
        },
        _ => MigrationError::FreezeFailed(message),
    }
}

/// Migrates `old_instance` with `descriptor`, then chases the resulting
/// instance through any further descriptor the plan has for *its* type.
///
/// This is what keeps a chained plan (A->B, B->C) from ever leaving a
/// freshly-constructed B in the graph: since the plan runs tail-first,
/// B->C's rewrite pass has already completed by the time A->B runs, so a
/// brand new B minted by A's transformer would otherwise never get the
/// B->C treatment. Chasing it here, inline, avoids a second rewrite pass
/// over the whole graph.
fn resolve_chain(
    plan: &Plan,
    descriptor: &TransformerDescriptor,
    old_instance: Arc<dyn GraphNode>,
) -> Result<Arc<dyn GraphNode>, MigrationError> {
    let mut current = descriptor.migrate(old_instance)?;
    while let Some(next) = plan.descriptor_for(current.migratable_type()) {
        current = next.migrate(current)?;
    }
    Ok(current)
}
