// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The seam between the engine and the host application's object graph.
//!
//! Rust has no runtime reflection, so unlike a JVM-hosted implementation the
//! engine cannot discover an arbitrary struct's fields on its own. Instead,
//! application types that should participate in migration implement
//! [`GraphNode`], declaring their outbound reference slots explicitly. This
//! is the concrete realization of the `SPEC` heap-walk mode from `spec.md`
//! §4.2: the caller-supplied roots are the registered [`GraphNode`]
//! instances, and "transitive references" are whatever [`GraphNode::slots`]
//! reports, followed recursively.
//!
//! Every slot holds `Arc<dyn GraphNode>` rather than `Arc<dyn Migratable>`:
//! since [`GraphNode`] methods default to an empty slot list, a "leaf"
//! instance with no outbound references of its own is simply a `GraphNode`
//! impl that never overrides those defaults. This keeps traversal uniform
//! with no need to downcast a trait object to a different trait object
//! mid-walk (Rust has no such cast; trait *upcasting* from `dyn GraphNode`
//! to `dyn Migratable` is fine, the reverse is not expressible).

use std::any::Any;
use std::sync::{Arc, RwLock};

use crate::ids::{ObjectId, TypeId};

/// Marker trait for anything that can be a node in the migrated graph:
/// replaceable instances (old and new) and any container/registry object
/// that merely holds references to them.
///
/// Mirrors `spec.md`'s exclusion list directly: primitives and interned
/// values (numbers, bools, `&'static str`) are never required to implement
/// this trait, since the rewriter only ever descends into declared slots.
pub trait Migratable: Any + Send + Sync {
    /// Returns the concrete [`TypeId`] of this instance, used to match it
    /// against a [`crate::transformer::TransformerDescriptor::from`].
    fn migratable_type(&self) -> TypeId;

    /// Upcasts to `&dyn Any` for downcasting by transformers.
    fn as_any(&self) -> &dyn Any;
}

/// An object that exposes its outbound reference slots for rewriting.
///
/// All five accessor methods default to empty: a type implements only the
/// slot kinds it actually has, and a leaf instance with no outbound
/// references needs no overrides at all. The rewriter (`src/rewrite.rs`)
/// calls all five for every object it visits; the heap walker
/// (`src/heap_walker.rs`) uses the same five to discover reachability.
pub trait GraphNode: Migratable {
    /// Object-field slots, including those conceptually declared on a
    /// supertype (Rust has no inheritance, so "supertype fields" simply
    /// means: list every field regardless of which impl block it lives in).
    fn field_slots(&self) -> Vec<Arc<dyn FieldSlot>> {
        Vec::new()
    }
    /// Ordered-sequence slots.
    fn sequence_slots(&self) -> Vec<Arc<dyn SequenceSlot>> {
        Vec::new()
    }
    /// Identity/hash-keyed set slots.
    fn set_slots(&self) -> Vec<Arc<dyn SetSlot>> {
        Vec::new()
    }
    /// Mapping slots.
    fn map_slots(&self) -> Vec<Arc<dyn MapSlot>> {
        Vec::new()
    }
    /// Weak/back-reference slots.
    fn weak_slots(&self) -> Vec<Arc<dyn WeakSlot>> {
        Vec::new()
    }
}

/// A single mutable reference slot (an object field).
pub trait FieldSlot: Send + Sync {
    /// Reads the current referent.
    fn get(&self) -> Arc<dyn GraphNode>;
    /// Overwrites the referent. Fails if the slot is read-only.
    fn set(&self, new: Arc<dyn GraphNode>) -> Result<(), String>;
}

/// An ordered sequence slot (array, `Vec`, `VecDeque`).
pub trait SequenceSlot: Send + Sync {
    /// Number of elements.
    fn len(&self) -> usize;
    /// True when the sequence is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Reads the element at `index`.
    fn get(&self, index: usize) -> Arc<dyn GraphNode>;
    /// Overwrites the element at `index`, preserving order.
    fn set(&self, index: usize, new: Arc<dyn GraphNode>) -> Result<(), String>;
}

/// An identity- or hash-keyed set slot.
///
/// Sets cannot be rewritten element-by-element in place when a
/// replacement's hash differs from the original's: `spec.md` §4.3 requires
/// the set be rebuilt. `rebuild` receives the full new membership (the
/// rewriter substitutes replaced elements before calling it).
pub trait SetSlot: Send + Sync {
    /// Current membership, in the slot's own iteration order.
    fn members(&self) -> Vec<Arc<dyn GraphNode>>;
    /// Replaces the set's contents wholesale.
    fn rebuild(&self, members: Vec<Arc<dyn GraphNode>>) -> Result<(), String>;
    /// The type every member must satisfy, if this slot enforces one
    /// (`spec.md` §4.4: "used by the rewriter when a container element's
    /// declared type must remain valid"). `None` means the slot accepts any
    /// `GraphNode`, the common case for a heterogeneous collection with no
    /// declared element type.
    fn element_type_bound(&self) -> Option<TypeId> {
        None
    }
}

/// A mapping slot (keys and/or values may reference migrated instances).
///
/// Per `spec.md` §4.3: values are always rewritten in place; a key is
/// rewritten in place only if the new key hashes the same as the old one,
/// otherwise the entry must be re-inserted under the new key, with
/// last-writer-wins on collision.
pub trait MapSlot: Send + Sync {
    /// Current entries, in the slot's own iteration order.
    fn entries(&self) -> Vec<(Arc<dyn GraphNode>, Arc<dyn GraphNode>)>;
    /// Replaces the map's contents wholesale after key/value rewriting.
    fn rebuild(&self, entries: Vec<(Arc<dyn GraphNode>, Arc<dyn GraphNode>)>) -> Result<(), String>;
    /// Whether the engine must treat keys of this map as identity-sensitive
    /// (re-insert on hash change) rather than leaving them untouched.
    fn keys_are_identity_sensitive(&self) -> bool {
        true
    }
    /// The type every value must satisfy, if this slot enforces one. See
    /// [`SetSlot::element_type_bound`].
    fn element_type_bound(&self) -> Option<TypeId> {
        None
    }
}

/// A non-owning ("weak") reference slot.
///
/// Rewritten by the same rules as [`FieldSlot`], but `spec.md` §4.3 requires
/// that following it never counts as ownership — the heap walker does not
/// traverse *into* the referent via a weak slot when building the
/// reachability set, it only rewires the slot itself if the referent is
/// already known to be replaced.
pub trait WeakSlot: Send + Sync {
    /// Reads the current referent, if still alive.
    fn get(&self) -> Option<Arc<dyn GraphNode>>;
    /// Overwrites the referent.
    fn set(&self, new: Option<Arc<dyn GraphNode>>) -> Result<(), String>;
}

/// A simple [`FieldSlot`] backed by an in-memory `RwLock`, usable directly
/// by application types that just want a plain migratable field without
/// writing their own slot impl.
pub struct LockFieldSlot(RwLock<Arc<dyn GraphNode>>);

impl LockFieldSlot {
    /// Wraps an initial referent.
    #[must_use]
    pub fn new(initial: Arc<dyn GraphNode>) -> Arc<Self> {
        Arc::new(Self(RwLock::new(initial)))
    }
}

impl FieldSlot for LockFieldSlot {
    fn get(&self) -> Arc<dyn GraphNode> {
        self.0
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set(&self, new: Arc<dyn GraphNode>) -> Result<(), String> {
        let mut guard = self
            .0
            .write()
            .map_err(|_| "field lock poisoned".to_string())?;
        *guard = new;
        Ok(())
    }
}

/// Identity of the object behind an `Arc<dyn GraphNode>`, for map/set
/// bookkeeping in the rewriter.
#[must_use]
pub fn object_id(instance: &Arc<dyn GraphNode>) -> ObjectId {
    ObjectId::of(instance)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use std::any::Any as _;

    struct Leaf;
    impl Migratable for Leaf {
        fn migratable_type(&self) -> TypeId {
            TypeId::of::<Leaf>()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }
    impl GraphNode for Leaf {}

    #[test]
    fn leaf_node_has_no_slots_by_default() {
        let leaf: Arc<dyn GraphNode> = Arc::new(Leaf);
        assert!(leaf.field_slots().is_empty());
        assert!(leaf.sequence_slots().is_empty());
        assert!(leaf.set_slots().is_empty());
        assert!(leaf.map_slots().is_empty());
        assert!(leaf.weak_slots().is_empty());
    }

    #[test]
    fn lock_field_slot_round_trips() {
        let a: Arc<dyn GraphNode> = Arc::new(Leaf);
        let b: Arc<dyn GraphNode> = Arc::new(Leaf);
        let slot = LockFieldSlot::new(a.clone());
        assert_eq!(object_id(&slot.get()), object_id(&a));
        slot.set(b.clone()).expect("lock is healthy");
        assert_eq!(object_id(&slot.get()), object_id(&b));
    }
}
