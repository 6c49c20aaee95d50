// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Testable properties 1 and 2 (`spec.md` §8), exercised over randomly
//! shuffled chains rather than a single hand-picked one: any acyclic chain
//! orders tail-first, and closing a chain into a cycle always gets rejected.
//!
//! Pins a deterministic seed for reproducible failures, matching the
//! teacher's own seed-pinning pattern.

#![allow(missing_docs)]

use std::any::Any;
use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestCaseError, TestRng, TestRunner};

use live_migrate::{
    GraphNode, Migratable, MigrationError, Plan, Transformer, TransformerDescriptor, TypeId,
};

macro_rules! declare_marker {
    ($name:ident) => {
        struct $name;
        impl Migratable for $name {
            fn migratable_type(&self) -> TypeId {
                TypeId::of::<$name>()
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }
        impl GraphNode for $name {}
    };
}

declare_marker!(T0);
declare_marker!(T1);
declare_marker!(T2);
declare_marker!(T3);
declare_marker!(T4);
declare_marker!(T5);
declare_marker!(T6);
declare_marker!(T7);

fn marker_type_id(index: usize) -> TypeId {
    match index {
        0 => TypeId::of::<T0>(),
        1 => TypeId::of::<T1>(),
        2 => TypeId::of::<T2>(),
        3 => TypeId::of::<T3>(),
        4 => TypeId::of::<T4>(),
        5 => TypeId::of::<T5>(),
        6 => TypeId::of::<T6>(),
        _ => TypeId::of::<T7>(),
    }
}

struct Identity {
    from: TypeId,
    to: TypeId,
}
impl Transformer for Identity {
    fn from(&self) -> TypeId {
        self.from
    }
    fn to(&self) -> TypeId {
        self.to
    }
    fn migrate(&self, old: Arc<dyn GraphNode>) -> Result<Arc<dyn GraphNode>, MigrationError> {
        Ok(old)
    }
}

fn descriptor(from: TypeId, to: TypeId) -> TransformerDescriptor {
    TransformerDescriptor::new(from, to, from, Arc::new(Identity { from, to }))
}

fn seeded_runner() -> TestRunner {
    const SEED_BYTES: [u8; 32] = [0x5a; 32];
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    TestRunner::new_with_rng(PropConfig::default(), rng)
}

#[test]
fn random_acyclic_chains_always_order_tail_first() {
    let chain_order = Just(vec![0usize, 1, 2, 3, 4, 5, 6, 7]).prop_shuffle();

    seeded_runner()
        .run(&chain_order, |order| {
            let descriptors: Vec<TransformerDescriptor> = order
                .windows(2)
                .map(|pair| descriptor(marker_type_id(pair[0]), marker_type_id(pair[1])))
                .collect();

            let plan = Plan::build(descriptors)
                .map_err(|error| TestCaseError::fail(error.to_string()))?;

            let built_order: Vec<TypeId> =
                plan.ordered().map(TransformerDescriptor::source).collect();

            // The last edge in the chain must execute before the first one:
            // every descriptor sits ahead of whatever descriptor consumes
            // its own `to` as a `from`.
            let last_edge_source = marker_type_id(order[order.len() - 2]);
            let first_edge_source = marker_type_id(order[0]);
            let last_pos = built_order
                .iter()
                .position(|t| *t == last_edge_source)
                .ok_or_else(|| TestCaseError::fail("last edge missing from ordered plan"))?;
            let first_pos = built_order
                .iter()
                .position(|t| *t == first_edge_source)
                .ok_or_else(|| TestCaseError::fail("first edge missing from ordered plan"))?;
            prop_assert!(last_pos < first_pos);
            Ok(())
        })
        .expect("proptest with pinned seed should complete");
}

#[test]
fn closing_any_random_chain_into_a_cycle_is_always_rejected() {
    let chain_order = Just(vec![0usize, 1, 2, 3, 4, 5, 6, 7]).prop_shuffle();

    seeded_runner()
        .run(&chain_order, |order| {
            let mut descriptors: Vec<TransformerDescriptor> = order
                .windows(2)
                .map(|pair| descriptor(marker_type_id(pair[0]), marker_type_id(pair[1])))
                .collect();
            // Close the chain: last type's "source" back to the first type.
            descriptors.push(descriptor(
                marker_type_id(order[order.len() - 1]),
                marker_type_id(order[0]),
            ));

            let error = Plan::build(descriptors)
                .err()
                .ok_or_else(|| TestCaseError::fail("cyclic plan was accepted"))?;
            let is_plan_invalid = matches!(error, MigrationError::PlanInvalid { .. });
            prop_assert!(is_plan_invalid);
            Ok(())
        })
        .expect("proptest with pinned seed should complete");
}
