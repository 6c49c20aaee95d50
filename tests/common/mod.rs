// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use std::any::Any;
use std::sync::{Arc, RwLock};

use live_migrate::{
    FieldSlot, GraphNode, LockFieldSlot, Migratable, MigrationError, SequenceSlot, Transformer,
    TransformerDescriptor, TypeId,
};

/// A labeled user record, pre-migration shape.
pub struct OldUser {
    pub id: u64,
    pub name: &'static str,
}
impl Migratable for OldUser {
    fn migratable_type(&self) -> TypeId {
        TypeId::of::<OldUser>()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
impl GraphNode for OldUser {}

/// Same record, post-migration shape.
pub struct NewUser {
    pub id: u64,
    pub name: &'static str,
}
impl Migratable for NewUser {
    fn migratable_type(&self) -> TypeId {
        TypeId::of::<NewUser>()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
impl GraphNode for NewUser {}

/// A field-by-field `OldUser -> NewUser` transformer.
pub struct UserTransformer;
impl Transformer for UserTransformer {
    fn from(&self) -> TypeId {
        TypeId::of::<OldUser>()
    }
    fn to(&self) -> TypeId {
        TypeId::of::<NewUser>()
    }
    fn migrate(&self, old: Arc<dyn GraphNode>) -> Result<Arc<dyn GraphNode>, MigrationError> {
        let old: &OldUser = old.as_any().downcast_ref().expect("instance is an OldUser");
        Ok(Arc::new(NewUser {
            id: old.id,
            name: old.name,
        }))
    }
}

pub fn user_descriptor() -> TransformerDescriptor {
    let from = TypeId::of::<OldUser>();
    let to = TypeId::of::<NewUser>();
    TransformerDescriptor::new(from, to, from, Arc::new(UserTransformer))
}

/// An ordered-sequence slot backed by a plain `Vec`, standing in for an
/// application collection field.
pub struct VecSlot(RwLock<Vec<Arc<dyn GraphNode>>>);
impl VecSlot {
    pub fn new(members: Vec<Arc<dyn GraphNode>>) -> Arc<Self> {
        Arc::new(Self(RwLock::new(members)))
    }
}
impl SequenceSlot for VecSlot {
    fn len(&self) -> usize {
        self.0
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
    fn get(&self, index: usize) -> Arc<dyn GraphNode> {
        self.0.read().unwrap_or_else(std::sync::PoisonError::into_inner)[index].clone()
    }
    fn set(&self, index: usize, new: Arc<dyn GraphNode>) -> Result<(), String> {
        let mut guard = self
            .0
            .write()
            .map_err(|_| "vec slot poisoned".to_string())?;
        guard[index] = new;
        Ok(())
    }
}

/// An application "registry" root: an ordered list of migratable members,
/// standing in for `spec.md`'s S1/S2 scenario registry object.
pub struct Registry {
    pub items: Arc<VecSlot>,
}
impl Migratable for Registry {
    fn migratable_type(&self) -> TypeId {
        TypeId::of::<Registry>()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
impl GraphNode for Registry {
    fn sequence_slots(&self) -> Vec<Arc<dyn SequenceSlot>> {
        vec![self.items.clone()]
    }
}

pub fn registry(members: Vec<Arc<dyn GraphNode>>) -> Arc<Registry> {
    Arc::new(Registry {
        items: VecSlot::new(members),
    })
}

/// A single mutable field slot, used as a one-element root for tests that
/// only need a single replaceable child.
pub struct Holder {
    pub child: Arc<dyn FieldSlot>,
}
impl Migratable for Holder {
    fn migratable_type(&self) -> TypeId {
        TypeId::of::<Holder>()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
impl GraphNode for Holder {
    fn field_slots(&self) -> Vec<Arc<dyn FieldSlot>> {
        vec![self.child.clone()]
    }
}

pub fn holder(child: Arc<dyn GraphNode>) -> Arc<Holder> {
    Arc::new(Holder {
        child: LockFieldSlot::new(child),
    })
}
