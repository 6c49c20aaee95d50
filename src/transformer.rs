// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transformer contract and descriptor (`spec.md` §3, §6).

use std::sync::Arc;

use crate::error::MigrationError;
use crate::ids::TypeId;
use crate::migratable::GraphNode;

/// A transformer migrates one old instance to one new instance.
///
/// `migrate` must be pure with respect to the graph: the caller does not
/// retain any reference to `old` after the call returns, and the returned
/// instance must not capture `old` either (`spec.md` §6).
pub trait Transformer: Send + Sync {
    /// The old type this transformer accepts.
    fn from(&self) -> TypeId;
    /// The new type this transformer produces.
    fn to(&self) -> TypeId;
    /// Produces a replacement for `old`.
    ///
    /// # Errors
    /// Returns [`MigrationError::TransformFailed`] if construction of the
    /// replacement fails for any reason.
    fn migrate(&self, old: Arc<dyn GraphNode>) -> Result<Arc<dyn GraphNode>, MigrationError>;
}

/// A registered (old -> new) pair plus the metadata needed to keep
/// container element types valid after rewiring.
#[derive(Clone)]
pub struct TransformerDescriptor {
    from: TypeId,
    to: TypeId,
    common_super_type: TypeId,
    transformer: Arc<dyn Transformer>,
}

impl TransformerDescriptor {
    /// Builds a descriptor from an old type, a new type, a common
    /// supertype both satisfy, and the transformer implementation.
    ///
    /// This does not itself validate `from != to` or the supertype
    /// relationship — those are plan-build-time checks (`spec.md` §4.1),
    /// since validating a supertype relationship generically requires the
    /// caller to assert it (Rust's trait system can express "both
    /// implement trait X", but `commonSuperType` in the spec is a single
    /// runtime value shared across descriptors built from different
    /// concrete types, so it is supplied, not inferred).
    pub fn new(
        from: TypeId,
        to: TypeId,
        common_super_type: TypeId,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        Self {
            from,
            to,
            common_super_type,
            transformer,
        }
    }

    /// The old type.
    #[must_use]
    pub fn source(&self) -> TypeId {
        self.from
    }

    /// The new type.
    #[must_use]
    pub fn target(&self) -> TypeId {
        self.to
    }

    /// The shared supertype used for container-element retyping.
    #[must_use]
    pub fn common_super_type(&self) -> TypeId {
        self.common_super_type
    }

    /// Invokes the underlying transformer.
    ///
    /// # Errors
    /// Propagates [`MigrationError::TransformFailed`] from the transformer.
    pub fn migrate(&self, old: Arc<dyn GraphNode>) -> Result<Arc<dyn GraphNode>, MigrationError> {
        self.transformer.migrate(old)
    }
}

impl std::fmt::Debug for TransformerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerDescriptor")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("common_super_type", &self.common_super_type)
            .finish_non_exhaustive()
    }
}
