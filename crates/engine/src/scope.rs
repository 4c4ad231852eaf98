//! Scope Admission Control
//!
//! At most one interaction may be in flight per (identity, agent kind)
//! scope; a second concurrent request for the same scope is rejected rather
//! than queued. Different scopes proceed fully in parallel. Guards release
//! their scope on drop, so an interaction that fails or is cancelled never
//! leaves its scope stuck busy.

use mentor_core::conversation::Scope;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Default)]
pub struct ScopeLocks {
    active: Arc<Mutex<HashSet<Scope>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the scope as busy. Returns `None` when another interaction
    /// already holds it.
    pub fn try_acquire(&self, scope: &Scope) -> Option<ScopeGuard> {
        let mut active = lock_active(&self.active);
        if active.insert(scope.clone()) {
            Some(ScopeGuard {
                scope: scope.clone(),
                active: Arc::clone(&self.active),
            })
        } else {
            None
        }
    }
}

fn lock_active(active: &Mutex<HashSet<Scope>>) -> MutexGuard<'_, HashSet<Scope>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// RAII marker for an in-flight interaction on one scope.
pub struct ScopeGuard {
    scope: Scope,
    active: Arc<Mutex<HashSet<Scope>>>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        lock_active(&self.active).remove(&self.scope);
    }
}
