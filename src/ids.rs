// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier types used throughout the engine.
//!
//! `TypeId` wraps [`std::any::TypeId`] with a human-readable label so error
//! messages and events never print an opaque hash. `ObjectId` is the
//! pointer-identity of a migratable instance: identity-keyed, never
//! value-equality, matching the `RewriteMap` invariant in `spec.md` §3.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A logical type identifier: old class, new class, or common supertype.
///
/// Two `TypeId`s compare equal iff they name the same Rust type. The label
/// is purely diagnostic and does not participate in equality.
#[derive(Clone, Copy, PartialOrd, Ord)]
pub struct TypeId {
    rust_id: std::any::TypeId,
    name: &'static str,
}

impl TypeId {
    /// Builds a `TypeId` for `T`.
    #[must_use]
    pub fn of<T: Any + ?Sized + 'static>() -> Self {
        Self {
            rust_id: std::any::TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Human-readable label for diagnostics (not a stable identifier).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl PartialEq for TypeId {
    fn eq(&self, other: &Self) -> bool {
        self.rust_id == other.rust_id
    }
}

impl Eq for TypeId {}

impl std::hash::Hash for TypeId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rust_id.hash(state);
    }
}

/// Pointer-identity of a migratable instance.
///
/// Built from the data pointer of the `Arc` holding the instance. Two
/// `ObjectId`s are equal iff they were derived from the same allocation,
/// regardless of the values the allocation holds — the identity-keyed
/// property `spec.md` §3 requires of `RewriteMap`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Derives the identity of the instance behind `arc`.
    #[must_use]
    pub fn of<T: ?Sized>(arc: &Arc<T>) -> Self {
        Self(Arc::as_ptr(arc).cast::<()>() as usize)
    }
}

/// Per-run identifier for a [`crate::context::MigrationContext`].
///
/// Generated from a process-local monotonic counter rather than a random
/// UUID: migrations run one at a time on a single dedicated thread
/// (`spec.md` §5), so a counter is sufficient and avoids pulling in a UUID
/// dependency the rest of the crate has no other use for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MigrationId(u64);

impl MigrationId {
    /// Allocates the next `MigrationId` in process order.
    #[must_use]
    pub fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying counter value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "migration-{}", self.0)
    }
}
