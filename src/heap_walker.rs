// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Heap enumeration (`spec.md` §4.2).
//!
//! `FULL` mode requires a runtime primitive that can enumerate every live
//! instance of a given type. No such primitive exists in stable Rust, so
//! `FULL` is expressed as the [`HeapProbe`] trait: a host *could* supply one
//! (for example, backed by a custom global allocator that tracks live
//! allocations by type), but the crate's own [`HeapProbe`] always reports
//! [`HeapWalkError::Unsupported`]. `SPEC` mode is always available: it walks
//! outward from caller-registered [`GraphNode`] roots via their declared
//! slots, exactly as `spec.md` describes.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::ids::{ObjectId, TypeId};
use crate::migratable::{object_id, GraphNode};

/// Heap-walk strategy selector (`heap.walk.mode` in `spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapWalkMode {
    /// Enumerate every live instance via a [`HeapProbe`].
    Full,
    /// Enumerate only instances reachable from the registered roots.
    Spec,
}

/// Error surfaced by [`HeapWalker::snapshot`].
#[derive(Debug, Error)]
pub enum HeapWalkError {
    /// `FULL` mode was requested but no [`HeapProbe`] supports it.
    #[error("heap walk unsupported in this mode")]
    Unsupported,
    /// The walk did not complete within the configured timeout.
    #[error("heap walk timed out after visiting {partial_count} instance(s)")]
    Timeout {
        /// Instances observed before the timeout fired.
        partial_count: usize,
    },
    /// The probe or traversal failed for an implementation-specific reason.
    #[error("heap walk failed: {0}")]
    Failed(String),
}

/// A per-type mapping of live instances taken under mutation freeze
/// (`spec.md` §3). Valid from capture until the rewrite for that type
/// completes.
#[derive(Default)]
pub struct HeapSnapshot {
    by_type: BTreeMap<TypeId, Vec<Arc<dyn GraphNode>>>,
}

impl fmt::Debug for HeapSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapSnapshot")
            .field(
                "by_type",
                &self
                    .by_type
                    .iter()
                    .map(|(ty, instances)| (ty.name(), instances.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl HeapSnapshot {
    /// Instances of `old_type` captured in this snapshot, in deterministic
    /// discovery order.
    #[must_use]
    pub fn instances_of(&self, old_type: TypeId) -> &[Arc<dyn GraphNode>] {
        self.by_type
            .get(&old_type)
            .map_or(&[], std::vec::Vec::as_slice)
    }

    /// Total instance count across every type in the snapshot.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    /// Approximate resident size, in bytes, of every captured instance.
    ///
    /// `size_of_val` on a `dyn GraphNode` reference reads the concrete
    /// type's size out of the trait object's vtable, so this is the real
    /// stack footprint of each instance's own fields — not a recursive
    /// measure of everything it points to, since the engine has no way to
    /// tell an owned child from a shared one. Used to gate `heap.size.min`
    /// / `heap.size.max` (`spec.md` §6, values in MiB) against something
    /// closer to actual memory than a bare instance count.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.by_type
            .values()
            .flatten()
            .map(|instance| std::mem::size_of_val(instance.as_ref()) as u64)
            .sum()
    }
}

/// A global-enumeration primitive for `FULL` mode.
///
/// The crate ships only [`NoProbe`], which always returns `None`. A host
/// runtime with a heap-tracking allocator or similar facility can implement
/// this trait to make `FULL` mode functional.
pub trait HeapProbe: Send + Sync {
    /// Returns every live instance of `type_id`, or `None` if this probe
    /// cannot enumerate that type.
    fn enumerate(&self, type_id: TypeId) -> Option<Vec<Arc<dyn GraphNode>>>;
}

/// The default [`HeapProbe`]: never supports `FULL` mode.
pub struct NoProbe;

impl HeapProbe for NoProbe {
    fn enumerate(&self, _type_id: TypeId) -> Option<Vec<Arc<dyn GraphNode>>> {
        None
    }
}

/// Walks the application's object graph to produce a [`HeapSnapshot`].
pub struct HeapWalker {
    roots: Vec<Arc<dyn GraphNode>>,
    probe: Arc<dyn HeapProbe>,
}

impl Default for HeapWalker {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapWalker {
    /// Builds a walker with no roots and no `FULL`-mode support.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            probe: Arc::new(NoProbe),
        }
    }

    /// Registers an application root for `SPEC` mode traversal.
    pub fn register_root(&mut self, root: Arc<dyn GraphNode>) {
        self.roots.push(root);
    }

    /// Installs a [`HeapProbe`] used for `FULL` mode.
    pub fn set_probe(&mut self, probe: Arc<dyn HeapProbe>) {
        self.probe = probe;
    }

    /// The registered roots, reused by the rewriter to re-traverse the same
    /// reachable set after each type's transformers run.
    #[must_use]
    pub fn roots(&self) -> &[Arc<dyn GraphNode>] {
        &self.roots
    }

    /// Captures a [`HeapSnapshot`] of every instance of each type in
    /// `types`. Must be called with mutation already frozen (`spec.md`
    /// §4.2's consistency invariant).
    ///
    /// # Errors
    /// Returns [`HeapWalkError::Unsupported`] for `FULL` mode without a
    /// capable probe, [`HeapWalkError::Timeout`] if `timeout` (when
    /// non-zero) elapses before the walk completes, or
    /// [`HeapWalkError::Failed`] for other implementation failures.
    pub fn snapshot(
        &self,
        types: &[TypeId],
        mode: HeapWalkMode,
        timeout: Duration,
    ) -> Result<HeapSnapshot, HeapWalkError> {
        match mode {
            HeapWalkMode::Full => self.snapshot_full(types),
            HeapWalkMode::Spec => self.snapshot_spec(types, timeout),
        }
    }

    fn snapshot_full(&self, types: &[TypeId]) -> Result<HeapSnapshot, HeapWalkError> {
        let mut by_type = BTreeMap::new();
        for &type_id in types {
            let instances = self
                .probe
                .enumerate(type_id)
                .ok_or(HeapWalkError::Unsupported)?;
            by_type.insert(type_id, instances);
        }
        Ok(HeapSnapshot { by_type })
    }

    /// Breadth-first traversal from the registered roots, collecting every
    /// reachable instance whose [`TypeId`] exactly matches an entry in
    /// `types` (subtypes are never matched, per `spec.md` §4.2).
    fn snapshot_spec(
        &self,
        types: &[TypeId],
        timeout: Duration,
    ) -> Result<HeapSnapshot, HeapWalkError> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        let wanted: HashSet<TypeId> = types.iter().copied().collect();

        let mut by_type: BTreeMap<TypeId, Vec<Arc<dyn GraphNode>>> =
            types.iter().map(|t| (*t, Vec::new())).collect();
        let mut visited: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<Arc<dyn GraphNode>> = self.roots.iter().cloned().collect();
        let mut visited_count = 0usize;

        while let Some(node) = queue.pop_front() {
            if let Some(deadline) = deadline {
                if Instant::now() > deadline {
                    return Err(HeapWalkError::Timeout {
                        partial_count: visited_count,
                    });
                }
            }

            let id = object_id(&node);
            if !visited.insert(id) {
                continue;
            }
            visited_count += 1;

            if wanted.contains(&node.migratable_type()) {
                if let Some(bucket) = by_type.get_mut(&node.migratable_type()) {
                    bucket.push(node.clone());
                }
            }

            for slot in node.field_slots() {
                queue.push_back(slot.get());
            }
            for slot in node.sequence_slots() {
                for i in 0..slot.len() {
                    queue.push_back(slot.get(i));
                }
            }
            for slot in node.set_slots() {
                for member in slot.members() {
                    queue.push_back(member);
                }
            }
            for slot in node.map_slots() {
                for (key, value) in slot.entries() {
                    queue.push_back(key);
                    queue.push_back(value);
                }
            }
            // Weak slots intentionally do not extend reachability
            // (`spec.md` §4.3: "do not count as ownership").
        }

        Ok(HeapSnapshot { by_type })
    }
}
