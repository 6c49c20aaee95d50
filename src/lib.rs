// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Live, in-process object-graph schema migration.
//!
//! Walks a running application's object graph, replaces every instance of
//! an old type with a freshly constructed instance of a new type, and
//! rewrites every reference to point at the replacement — all inside a
//! checkpoint/rollback envelope so a failure at any point after the
//! mutation freeze leaves the process exactly as it was before the
//! migration began. See [`engine::MigrationEngine`] for the entry point.

mod checkpoint;
mod config;
mod context;
mod engine;
mod error;
mod events;
mod heap_walker;
mod hooks;
mod ids;
mod migratable;
mod phase;
mod plan;
mod registry;
mod rewrite;
mod smoke;
mod transformer;

/// Host-provided checkpoint/restore facility and the engine's default.
pub use checkpoint::{CheckpointController, NoopCheckpointController};
/// Engine configuration, defaults, and the `.properties`/YAML loaders.
pub use config::Config;
/// Per-run state threaded through a single migration.
pub use context::MigrationContext;
/// The engine itself and its builder.
pub use engine::{MigrationEngine, MigrationEngineBuilder};
/// The migration engine's single tagged error type.
pub use error::MigrationError;
/// Structured events, severity levels, and the publish/subscribe bus.
pub use events::{AlertLevel, Event, EventBus, EventCause};
/// Heap enumeration: walk modes, the probe seam for `FULL` mode, snapshots.
pub use heap_walker::{HeapProbe, HeapSnapshot, HeapWalkError, HeapWalkMode, HeapWalker, NoProbe};
/// Application registry hooks fired after an instance is replaced.
pub use hooks::{HookRegistry, OnReplaced};
/// Identifier types: object identity, type identity, per-run migration id.
pub use ids::{MigrationId, ObjectId, TypeId};
/// The graph seam: `Migratable`, `GraphNode`, and the slot traits.
pub use migratable::{
    object_id, FieldSlot, GraphNode, LockFieldSlot, MapSlot, Migratable, SequenceSlot, SetSlot,
    WeakSlot,
};
/// Phase state machine, listener hooks, and the bounded run history.
pub use phase::{
    MigrationHistory, MigrationRecord, NoopPhaseListener, Outcome, Phase, PhaseListener,
};
/// A validated, topologically ordered migration plan.
pub use plan::Plan;
/// Read-only view over a built [`Plan`] for lookup and enumeration.
pub use registry::TransformerRegistry;
/// Reference rewriting: the substitution map and the rewriter itself.
pub use rewrite::{ReferenceRewriter, RewriteMap};
/// Post-rewrite smoke tests.
pub use smoke::{SmokeTest, SmokeTestRunner};
/// The transformer contract and its descriptor.
pub use transformer::{Transformer, TransformerDescriptor};
