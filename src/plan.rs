// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Plan builder: validates a list of [`TransformerDescriptor`]s and
//! produces a topologically ordered [`Plan`] (`spec.md` §4.1).

use std::collections::HashMap;

use crate::error::MigrationError;
use crate::ids::TypeId;
use crate::transformer::TransformerDescriptor;

/// A validated, topologically ordered migration plan.
///
/// Invariants (enforced at construction, see [`Plan::build`]):
/// - each `from` appears at most once;
/// - each `to` appears at most once;
/// - the `from -> to` graph, restricted to edges whose `to` is also some
///   other descriptor's `from`, is acyclic;
/// - `ordered` places every descriptor before any descriptor whose `from`
///   equals its `to` (tail-first).
#[derive(Clone, Debug)]
pub struct Plan {
    by_source: HashMap<TypeId, TransformerDescriptor>,
    ordered: Vec<TypeId>,
}

impl Plan {
    /// Validates `descriptors` and builds an ordered [`Plan`].
    ///
    /// # Errors
    /// Returns [`MigrationError::PlanInvalid`] with a `reason` identifying
    /// which `spec.md` §4.1 validation step failed: a degenerate descriptor
    /// (`from == to`), a duplicate source, a duplicate target, or a cycle.
    pub fn build(descriptors: Vec<TransformerDescriptor>) -> Result<Self, MigrationError> {
        let mut by_source: HashMap<TypeId, TransformerDescriptor> = HashMap::new();
        let mut by_target: HashMap<TypeId, TypeId> = HashMap::new();

        for descriptor in descriptors {
            if descriptor.source() == descriptor.target() {
                return Err(MigrationError::plan_invalid(format!(
                    "from and to must differ: {}",
                    descriptor.source().name()
                )));
            }
            if by_source.contains_key(&descriptor.source()) {
                return Err(MigrationError::plan_invalid(format!(
                    "duplicate source: {}",
                    descriptor.source().name()
                )));
            }
            if by_target.contains_key(&descriptor.target()) {
                return Err(MigrationError::plan_invalid(format!(
                    "duplicate target: {}",
                    descriptor.target().name()
                )));
            }
            by_target.insert(descriptor.target(), descriptor.source());
            by_source.insert(descriptor.source(), descriptor);
        }

        let ordered = topological_order(&by_source)?;

        Ok(Self { by_source, ordered })
    }

    /// An empty plan: valid, produces no work.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_source: HashMap::new(),
            ordered: Vec::new(),
        }
    }

    /// True when the plan has no descriptors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Descriptor count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    /// Looks up the descriptor whose source is `from`.
    #[must_use]
    pub fn descriptor_for(&self, from: TypeId) -> Option<&TransformerDescriptor> {
        self.by_source.get(&from)
    }

    /// Iterates descriptors in tail-first execution order.
    pub fn ordered(&self) -> impl Iterator<Item = &TransformerDescriptor> {
        self.ordered.iter().filter_map(|t| self.by_source.get(t))
    }
}

/// Post-order DFS from every source, per `spec.md` §4.1 step 5: a
/// descriptor is appended to the result only after its successor (the
/// descriptor whose `from` equals this one's `to`, if any) has already been
/// appended, yielding tail-first order (A->B, B->C produces [B->C, A->B]).
///
/// Cycle detection (step 4) rides along for free: a node re-entered while
/// still on the recursion stack is a cycle.
fn topological_order(
    by_source: &HashMap<TypeId, TransformerDescriptor>,
) -> Result<Vec<TypeId>, MigrationError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        InProgress,
        Done,
    }

    let mut marks: HashMap<TypeId, Mark> = HashMap::new();
    let mut ordered: Vec<TypeId> = Vec::with_capacity(by_source.len());

    fn visit(
        node: TypeId,
        by_source: &HashMap<TypeId, TransformerDescriptor>,
        marks: &mut HashMap<TypeId, Mark>,
        ordered: &mut Vec<TypeId>,
    ) -> Result<(), MigrationError> {
        match marks.get(&node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(MigrationError::plan_invalid(format!(
                    "cycle detected involving {}",
                    node.name()
                )));
            }
            None => {}
        }

        marks.insert(node, Mark::InProgress);

        if let Some(descriptor) = by_source.get(&node) {
            if by_source.contains_key(&descriptor.target()) {
                visit(descriptor.target(), by_source, marks, ordered)?;
            }
        }

        marks.insert(node, Mark::Done);
        ordered.push(node);
        Ok(())
    }

    // Iterate in a stable order derived from insertion: HashMap iteration
    // order is unspecified, but since every node is visited exactly once
    // regardless of starting order, the *set* of valid topological orders
    // is identical; we only need determinism across repeated builds of the
    // same plan, not across platforms, so sorting by type name is enough.
    let mut sources: Vec<TypeId> = by_source.keys().copied().collect();
    sources.sort_by_key(TypeId::name);

    for source in sources {
        visit(source, by_source, &mut marks, &mut ordered)?;
    }

    Ok(ordered)
}
