// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! S2 — Chained migration (`spec.md` §8): plan `{A -> B, B -> C}` must
//! leave no freshly-minted `B` behind, since tail-first ordering rewrites
//! `B -> C` before `A -> B` runs.

mod common;
use common::holder;

use std::any::Any;
use std::sync::Arc;

use live_migrate::{
    FieldSlot, GraphNode, MigrationEngine, MigrationError, Migratable, Plan, Transformer,
    TransformerDescriptor, TypeId,
};

struct A;
impl Migratable for A {
    fn migratable_type(&self) -> TypeId {
        TypeId::of::<A>()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
impl GraphNode for A {}

struct B;
impl Migratable for B {
    fn migratable_type(&self) -> TypeId {
        TypeId::of::<B>()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
impl GraphNode for B {}

struct C;
impl Migratable for C {
    fn migratable_type(&self) -> TypeId {
        TypeId::of::<C>()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
impl GraphNode for C {}

struct AToB;
impl Transformer for AToB {
    fn from(&self) -> TypeId {
        TypeId::of::<A>()
    }
    fn to(&self) -> TypeId {
        TypeId::of::<B>()
    }
    fn migrate(&self, _old: Arc<dyn GraphNode>) -> Result<Arc<dyn GraphNode>, MigrationError> {
        Ok(Arc::new(B))
    }
}

struct BToC;
impl Transformer for BToC {
    fn from(&self) -> TypeId {
        TypeId::of::<B>()
    }
    fn to(&self) -> TypeId {
        TypeId::of::<C>()
    }
    fn migrate(&self, _old: Arc<dyn GraphNode>) -> Result<Arc<dyn GraphNode>, MigrationError> {
        Ok(Arc::new(C))
    }
}

#[test]
fn chained_plan_orders_tail_first() {
    let a = TypeId::of::<A>();
    let b = TypeId::of::<B>();
    let c = TypeId::of::<C>();

    let plan = Plan::build(vec![
        TransformerDescriptor::new(a, b, a, Arc::new(AToB)),
        TransformerDescriptor::new(b, c, b, Arc::new(BToC)),
    ])
    .expect("valid plan");

    let order: Vec<TypeId> = plan.ordered().map(TransformerDescriptor::source).collect();
    assert_eq!(order, vec![b, a], "B -> C must be ordered before A -> B");
}

#[test]
fn chained_migration_never_leaves_an_intermediate_b_in_the_graph() {
    let a = TypeId::of::<A>();
    let b = TypeId::of::<B>();
    let c = TypeId::of::<C>();

    let plan = Plan::build(vec![
        TransformerDescriptor::new(a, b, a, Arc::new(AToB)),
        TransformerDescriptor::new(b, c, b, Arc::new(BToC)),
    ])
    .expect("valid plan");

    let root = holder(Arc::new(A));
    let engine = MigrationEngine::builder().with_root(root.clone()).build();
    engine.migrate(plan).expect("chained migration commits");

    let final_type = root.child.get().migratable_type();
    assert_eq!(final_type, c, "registry should end up holding a C, never a B");
}
