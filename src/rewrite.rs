// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reference rewriting (`spec.md` §3, §4.3).
//!
//! Given a [`RewriteMap`] of old-instance identity to its replacement, walks
//! the reachable graph from the caller's roots and swaps every slot that
//! points at a rewritten identity. Traversal visits the *pre-rewrite*
//! topology: a node's slot contents are read once before any substitution
//! is applied to that node, so the walk's reachability does not depend on
//! the order slots happen to be rewired in.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::MigrationError;
use crate::hooks::HookRegistry;
use crate::ids::{ObjectId, TypeId};
use crate::migratable::{object_id, GraphNode};
use crate::registry::TransformerRegistry;

/// Identity-keyed old-instance -> new-instance substitution table for one
/// transformer's worth of rewiring (`spec.md` §3: "`RewriteMap` ... keyed by
/// object identity, not value equality").
#[derive(Default)]
pub struct RewriteMap {
    old_type: Option<TypeId>,
    replacements: HashMap<ObjectId, (Arc<dyn GraphNode>, Arc<dyn GraphNode>)>,
}

impl RewriteMap {
    /// Builds an empty map for replacements of `old_type`.
    #[must_use]
    pub fn new(old_type: TypeId) -> Self {
        Self {
            old_type: Some(old_type),
            replacements: HashMap::new(),
        }
    }

    /// Records that `old` has been replaced by `new`.
    pub fn insert(&mut self, old: Arc<dyn GraphNode>, new: Arc<dyn GraphNode>) {
        self.replacements.insert(object_id(&old), (old, new));
    }

    /// Number of recorded replacements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    /// True when no replacements are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    fn lookup(&self, candidate: &Arc<dyn GraphNode>) -> Option<&Arc<dyn GraphNode>> {
        self.replacements
            .get(&object_id(candidate))
            .map(|(_, new)| new)
    }
}

/// Rewrites every slot in the graph reachable from `roots` that points at an
/// identity recorded in `rewrite_map`.
pub struct ReferenceRewriter;

impl ReferenceRewriter {
    /// Walks the graph from `roots`, substituting every slot referent found
    /// in `rewrite_map`, then fires the registered `on_replaced` hook for
    /// each replaced instance exactly once.
    ///
    /// Set and map slots are always rebuilt wholesale when any of their
    /// members are substituted: since slot members are opaque trait
    /// objects, the rewriter cannot itself compare hashes to decide an
    /// in-place update is safe, so it defers entirely to the slot's own
    /// `rebuild`, which reconstructs the application's real collection (a
    /// real `HashSet`/`HashMap` insert already resolves hash collisions).
    ///
    /// # Errors
    /// Returns [`MigrationError::RewriteFailed`] if any slot refuses the
    /// substitution (a read-only field, a rebuild failure).
    pub fn rewrite(
        roots: &[Arc<dyn GraphNode>],
        rewrite_map: &RewriteMap,
        hooks: &HookRegistry,
        registry: &TransformerRegistry,
    ) -> Result<usize, MigrationError> {
        if rewrite_map.is_empty() {
            return Ok(0);
        }

        let mut visited: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<Arc<dyn GraphNode>> = roots.iter().cloned().collect();
        let mut rewired = 0usize;

        while let Some(node) = queue.pop_front() {
            if !visited.insert(object_id(&node)) {
                continue;
            }

            rewired += rewrite_field_slots(&node, rewrite_map)?;
            rewired += rewrite_sequence_slots(&node, rewrite_map)?;
            rewired += rewrite_set_slots(&node, rewrite_map, registry)?;
            rewired += rewrite_map_slots(&node, rewrite_map, registry)?;
            rewired += rewrite_weak_slots(&node, rewrite_map)?;

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
            // Weak slots are rewired above but never extend traversal
            // (`spec.md` §4.3: following one "does not count as ownership").
        }

        if let Some(old_type) = rewrite_map.old_type {
            for (old, new) in rewrite_map.replacements.values() {
                hooks.fire(old_type, old, new);
            }
        }

        Ok(rewired)
    }
}

fn rewrite_error(rewrite_map: &RewriteMap, cause: impl Into<String>) -> MigrationError {
    let type_id = rewrite_map.old_type.unwrap_or_else(|| TypeId::of::<()>());
    MigrationError::rewrite_failed(type_id, cause)
}

/// Checks that the common supertype registered for this rewrite's source
/// type still satisfies a container element's declared type bound
/// (`spec.md` §4.4). `None` either way (no bound declared, or the type isn't
/// in the registry) is not an error: there is nothing to enforce.
fn check_element_type_bound(
    rewrite_map: &RewriteMap,
    registry: &TransformerRegistry,
    bound: Option<TypeId>,
) -> Result<(), MigrationError> {
    let Some(bound) = bound else {
        return Ok(());
    };
    let Some(old_type) = rewrite_map.old_type else {
        return Ok(());
    };
    let Some(common_super_type) = registry.common_super_type(old_type) else {
        return Ok(());
    };
    if common_super_type != bound {
        return Err(rewrite_error(
            rewrite_map,
            format!(
                "replacement's common supertype {} does not satisfy container's declared element type {}",
                common_super_type.name(),
                bound.name(),
            ),
        ));
    }
    Ok(())
}

fn rewrite_field_slots(
    node: &Arc<dyn GraphNode>,
    rewrite_map: &RewriteMap,
) -> Result<usize, MigrationError> {
    let mut count = 0;
    for slot in node.field_slots() {
        let current = slot.get();
        if let Some(replacement) = rewrite_map.lookup(&current) {
            slot.set(replacement.clone())
                .map_err(|cause| rewrite_error(rewrite_map, cause))?;
            count += 1;
        }
    }
    Ok(count)
}

fn rewrite_sequence_slots(
    node: &Arc<dyn GraphNode>,
    rewrite_map: &RewriteMap,
) -> Result<usize, MigrationError> {
    let mut count = 0;
    for slot in node.sequence_slots() {
        for index in 0..slot.len() {
            let current = slot.get(index);
            if let Some(replacement) = rewrite_map.lookup(&current) {
                slot.set(index, replacement.clone())
                    .map_err(|cause| rewrite_error(rewrite_map, cause))?;
                count += 1;
            }
        }
    }
    Ok(count)
}

fn rewrite_set_slots(
    node: &Arc<dyn GraphNode>,
    rewrite_map: &RewriteMap,
    registry: &TransformerRegistry,
) -> Result<usize, MigrationError> {
    let mut count = 0;
    for slot in node.set_slots() {
        let members = slot.members();
        let mut touched = false;
        let mut rebuilt: Vec<Arc<dyn GraphNode>> = Vec::with_capacity(members.len());
        for member in members {
            if let Some(replacement) = rewrite_map.lookup(&member) {
                check_element_type_bound(rewrite_map, registry, slot.element_type_bound())?;
                touched = true;
                count += 1;
                rebuilt.push(replacement.clone());
            } else {
                rebuilt.push(member);
            }
        }
        if touched {
            slot.rebuild(rebuilt)
                .map_err(|cause| rewrite_error(rewrite_map, cause))?;
        }
    }
    Ok(count)
}

fn rewrite_map_slots(
    node: &Arc<dyn GraphNode>,
    rewrite_map: &RewriteMap,
    registry: &TransformerRegistry,
) -> Result<usize, MigrationError> {
    let mut count = 0;
    for slot in node.map_slots() {
        let entries = slot.entries();
        let mut touched = false;
        let mut seen_keys: HashSet<ObjectId> = HashSet::new();
        let mut rebuilt: Vec<(Arc<dyn GraphNode>, Arc<dyn GraphNode>)> = Vec::with_capacity(entries.len());

        for (key, value) in entries {
            let new_key = if slot.keys_are_identity_sensitive() {
                rewrite_map.lookup(&key).cloned()
            } else {
                None
            };
            let new_value = rewrite_map.lookup(&value).cloned();

            if new_key.is_some() || new_value.is_some() {
                check_element_type_bound(rewrite_map, registry, slot.element_type_bound())?;
                touched = true;
                count += 1;
            }

            let final_key = new_key.unwrap_or(key);
            let final_value = new_value.unwrap_or(value);

            if !seen_keys.insert(object_id(&final_key)) {
                tracing::warn!(
                    "rewrite produced a key identity collision; last writer wins"
                );
                if let Some(existing) = rebuilt
                    .iter_mut()
                    .find(|(existing_key, _)| object_id(existing_key) == object_id(&final_key))
                {
                    existing.1 = final_value;
                    continue;
                }
            }

            rebuilt.push((final_key, final_value));
        }

        if touched {
            slot.rebuild(rebuilt)
                .map_err(|cause| rewrite_error(rewrite_map, cause))?;
        }
    }
    Ok(count)
}

fn rewrite_weak_slots(
    node: &Arc<dyn GraphNode>,
    rewrite_map: &RewriteMap,
) -> Result<usize, MigrationError> {
    let mut count = 0;
    for slot in node.weak_slots() {
        if let Some(current) = slot.get() {
            if let Some(replacement) = rewrite_map.lookup(&current) {
                slot.set(Some(replacement.clone()))
                    .map_err(|cause| rewrite_error(rewrite_map, cause))?;
                count += 1;
            }
        }
    }
    Ok(count)
}
