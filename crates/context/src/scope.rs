//! Scopes: cross-cutting behaviours pushed onto a [`Context`].
//!
//! A scope is begun when it is pushed and ended, in reverse push order, when
//! its context closes. Scopes are looked up by their concrete type, which
//! serves as the scope's type tag; two scope values are only ever equal if
//! they are the same allocation.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::Context;

/// Behaviour attached to a [`Context`] for the duration of its life.
///
/// Both hooks run synchronously: `on_scope_begin` on the thread that pushes
/// the scope, `on_scope_end` on the thread that closes the context. Scopes
/// needing mutable state use interior mutability.
pub trait Scope: Send + Sync + 'static {
    /// Called once, when the scope is pushed.
    fn on_scope_begin(&self, _context: &Context) {}

    /// Called once, when the owning context closes.
    fn on_scope_end(&self, _context: &Context) {}
}

/// One element of a context's scope stack.
#[derive(Clone)]
pub(crate) struct ScopeEntry {
    tag: TypeId,
    name: &'static str,
    hooks: Arc<dyn Scope>,
    any: Arc<dyn Any + Send + Sync>,
}

impl ScopeEntry {
    pub(crate) fn new<S: Scope>(scope: Arc<S>) -> Self {
        Self {
            tag: TypeId::of::<S>(),
            name: std::any::type_name::<S>(),
            hooks: scope.clone(),
            any: scope,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn hooks(&self) -> &Arc<dyn Scope> {
        &self.hooks
    }

    /// Returns the scope as `S` if that is its concrete type.
    pub(crate) fn downcast<S: Scope>(&self) -> Option<Arc<S>> {
        if self.tag != TypeId::of::<S>() {
            return None;
        }
        Arc::clone(&self.any).downcast::<S>().ok()
    }

    /// Identity comparison against a concrete scope handle.
    pub(crate) fn is<S: Scope>(&self, scope: &Arc<S>) -> bool {
        self.downcast::<S>()
            .is_some_and(|mine| Arc::ptr_eq(&mine, scope))
    }
}

impl std::fmt::Debug for ScopeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;
    impl Scope for Marker {}

    struct Other;
    impl Scope for Other {}

    #[test]
    fn downcast_matches_only_the_pushed_type() {
        let entry = ScopeEntry::new(Arc::new(Marker));
        assert!(entry.downcast::<Marker>().is_some());
        assert!(entry.downcast::<Other>().is_none());
    }

    #[test]
    fn identity_is_per_allocation() {
        let first = Arc::new(Marker);
        let second = Arc::new(Marker);
        let entry = ScopeEntry::new(Arc::clone(&first));
        assert!(entry.is(&first));
        assert!(!entry.is(&second));
    }
}
