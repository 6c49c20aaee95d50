// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Application registry hook (`spec.md` §6).
//!
//! The application may register a callback per replaced type so it can
//! swap module-level factories or caches the rewriter itself cannot reach
//! (anything not expressed as a [`crate::migratable::GraphNode`] slot).

use std::collections::HashMap;
use std::sync::Arc;

use crate::ids::TypeId;
use crate::migratable::GraphNode;

/// A callback invoked once per replaced instance, on the engine thread,
/// after the slot-level rewrite for that instance completes.
pub type OnReplaced = dyn Fn(&Arc<dyn GraphNode>, &Arc<dyn GraphNode>) + Send + Sync;

/// Per-type collection of [`OnReplaced`] callbacks.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<TypeId, Vec<Arc<OnReplaced>>>,
}

impl HookRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` to run for every instance of `old_type` replaced
    /// during a migration.
    pub fn register(&mut self, old_type: TypeId, hook: Arc<OnReplaced>) {
        self.hooks.entry(old_type).or_default().push(hook);
    }

    /// Invokes every hook registered for `old_type` with the replaced pair.
    pub(crate) fn fire(&self, old_type: TypeId, old: &Arc<dyn GraphNode>, new: &Arc<dyn GraphNode>) {
        if let Some(hooks) = self.hooks.get(&old_type) {
            for hook in hooks {
                hook(old, new);
            }
        }
    }
}
