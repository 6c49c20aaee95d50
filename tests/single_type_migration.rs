// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! S1 — Single-type migration (`spec.md` §8).

mod common;
use common::{registry, user_descriptor, NewUser, OldUser};

use std::sync::Arc;

use live_migrate::{GraphNode, MigrationEngine, Plan, SequenceSlot};

/// Plan `{OldUser -> NewUser}`, pre-state a registry list of two `OldUser`s.
/// Post-state: both replaced by `NewUser` with the same id/name, no
/// `OldUser` left reachable, migration `Done`.
#[test]
fn single_type_migration_replaces_every_instance_and_commits() {
    let alice: Arc<dyn GraphNode> = Arc::new(OldUser { id: 1, name: "a" });
    let bob: Arc<dyn GraphNode> = Arc::new(OldUser { id: 2, name: "b" });
    let root = registry(vec![alice, bob]);

    let plan = Plan::build(vec![user_descriptor()]).expect("valid plan");
    let engine = MigrationEngine::builder().with_root(root.clone()).build();

    let result = engine.migrate(plan);
    assert!(result.is_ok(), "migration should commit: {result:?}");

    assert_eq!(root.items.len(), 2);
    let first_item = root.items.get(0);
    let first: &NewUser = first_item.as_any().downcast_ref().expect("first is NewUser");
    let second_item = root.items.get(1);
    let second: &NewUser = second_item.as_any().downcast_ref().expect("second is NewUser");
    assert_eq!((first.id, first.name), (1, "a"));
    assert_eq!((second.id, second.name), (2, "b"));
}

/// Testable property 5 — rewrite completeness: after a successful run, no
/// reachable object still has the old type.
#[test]
fn no_old_type_instance_remains_reachable_after_migration() {
    let alice: Arc<dyn GraphNode> = Arc::new(OldUser { id: 7, name: "z" });
    let root = registry(vec![alice]);

    let plan = Plan::build(vec![user_descriptor()]).expect("valid plan");
    let engine = MigrationEngine::builder().with_root(root.clone()).build();
    engine.migrate(plan).expect("migration commits");

    assert_ne!(
        root.items.get(0).migratable_type(),
        live_migrate::TypeId::of::<OldUser>()
    );
}
