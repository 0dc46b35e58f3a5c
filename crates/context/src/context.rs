//! The hierarchical operation context.
//!
//! A [`Context`] is one node in a tree of operations. It owns:
//!
//! - a stack of [`Scope`]s, ended in reverse push order on close,
//! - the set of currently open child contexts,
//! - a registry of typed [`OutputSink`]s,
//! - cancellation state and cancellation handlers,
//! - a hold count deferring close,
//! - error/warning flags, propagated to the parent on close.
//!
//! ## Lifecycle
//!
//! ```text
//! Open ──close()──▶ Ending ──scopes ended──▶ Closed
//!   │                  (close() is a no-op while held or once Ending)
//!   └─ cancelled: NotCancelled ──set_cancelled()──▶ Cancelled (any state, sticky)
//! ```
//!
//! ## Cancellation
//!
//! Cancellation is cooperative: [`Context::set_cancelled`] flips a flag, runs
//! the handlers registered on this context, then forwards to the parent and
//! to every open child. The atomic flag is the only guard against running a
//! node's handlers twice when cancellation arrives from both directions. A
//! handler registered while a cancellation is in flight may therefore never
//! run; callers that care check [`Context::is_cancelled`] first.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error, info, warn};

use crate::errors::{classify, reportable_causes, Classification, ContextError};
use crate::output::{deliver, SinkRegistry};
use crate::outputs::{IssueOutput, PrintOutput};
use crate::scope::ScopeEntry;
use crate::{ContextId, Output, OutputSink, Propagation, Scope, SyncResult};

/// Where a context is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Accepting scopes and work.
    Open,
    /// `close()` has started ending scopes.
    Ending,
    /// All scopes ended and state propagated to the parent.
    Closed,
}

#[derive(Debug)]
struct Lifecycle {
    state: LifecycleState,
    hold_count: usize,
}

type CancellationHandler = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    id: ContextId,
    parent: Option<Context>,
    scopes: Mutex<Vec<ScopeEntry>>,
    children: Mutex<HashMap<ContextId, Weak<Inner>>>,
    sinks: Mutex<SinkRegistry>,
    /// Serialises sink invocation per context. Re-entrant so a sink may emit
    /// further output on the same context.
    output_lock: ReentrantMutex<()>,
    cancellation_handlers: Mutex<Vec<CancellationHandler>>,
    lifecycle: Mutex<Lifecycle>,
    cancelled: AtomicBool,
    has_errors: AtomicBool,
    has_warnings: AtomicBool,
    propagates_errors: AtomicBool,
}

/// Handle to one node of the operation hierarchy.
///
/// Cheap to clone; all clones refer to the same node. Safe to share across
/// threads.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Creates a root context.
    pub fn create() -> Context {
        Self::create_with(None)
    }

    /// Creates a child of `parent`.
    ///
    /// The child is registered with the parent for cancellation fan-out and
    /// error propagation. Pair this with a [`ContextGuard`] (or one of the
    /// helpers in [`crate::run`]) so that [`Context::close`] runs on every
    /// exit path.
    pub fn create_child(parent: &Context) -> Context {
        Self::create_with(Some(parent))
    }

    /// Creates a child of `parent`, or a root context when `parent` is `None`.
    pub fn create_with(parent: Option<&Context>) -> Context {
        let inner = Arc::new(Inner {
            id: ContextId::new_random(),
            parent: parent.cloned(),
            scopes: Mutex::new(Vec::new()),
            children: Mutex::new(HashMap::new()),
            sinks: Mutex::new(SinkRegistry::default()),
            output_lock: ReentrantMutex::new(()),
            cancellation_handlers: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Open,
                hold_count: 0,
            }),
            cancelled: AtomicBool::new(false),
            has_errors: AtomicBool::new(false),
            has_warnings: AtomicBool::new(false),
            propagates_errors: AtomicBool::new(true),
        });
        let context = Context { inner };

        if let Some(parent) = parent {
            parent
                .inner
                .children
                .lock()
                .insert(context.id(), Arc::downgrade(&context.inner));
            // Work started under an already cancelled operation starts cancelled.
            if parent.is_cancelled() {
                context.inner.cancelled.store(true, Ordering::SeqCst);
            }
        }

        debug!(
            context_id = %context.id(),
            parent_id = ?parent.map(Context::id),
            "context created"
        );
        context
    }

    /// Disables or enables close-time propagation of the error and warning
    /// flags, builder style.
    #[must_use]
    pub fn with_propagates_errors(self, propagates: bool) -> Self {
        self.set_propagates_errors(propagates);
        self
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Returns this context's identifier.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Returns the parent context, if any.
    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    /// Returns `true` if this context has no parent.
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Returns `true` if `other` refers to the same node.
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns a handle that does not keep the context alive.
    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    /// Pushes `scope` and begins it before returning.
    ///
    /// Pushing onto a context that is already ending is refused with a
    /// warning; the scope is neither begun nor ended.
    pub fn push<S: Scope>(&self, scope: Arc<S>) -> &Self {
        let entry = ScopeEntry::new(scope);
        {
            let lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state != LifecycleState::Open {
                warn!(
                    context_id = %self.id(),
                    scope = entry.name(),
                    "scope pushed onto a context that is already ending; ignored"
                );
                return self;
            }
            self.inner.scopes.lock().push(entry.clone());
        }
        entry.hooks().on_scope_begin(self);
        self
    }

    /// Returns the most recently pushed scope of type `S`, searching this
    /// context first and then its ancestors.
    pub fn get_scope<S: Scope>(&self) -> Option<Arc<S>> {
        let found = self
            .inner
            .scopes
            .lock()
            .iter()
            .rev()
            .find_map(ScopeEntry::downcast::<S>);
        match found {
            Some(scope) => Some(scope),
            None => self.parent().and_then(Context::get_scope::<S>),
        }
    }

    /// Returns every scope of type `S` visible from this context, innermost
    /// first.
    pub fn get_scopes<S: Scope>(&self) -> Vec<Arc<S>> {
        let mut scopes: Vec<Arc<S>> = self
            .inner
            .scopes
            .lock()
            .iter()
            .rev()
            .filter_map(ScopeEntry::downcast::<S>)
            .collect();
        if let Some(parent) = self.parent() {
            scopes.extend(parent.get_scopes::<S>());
        }
        scopes
    }

    /// Returns the nearest scope of the same type pushed before `scope`,
    /// searching below `scope` on this context's stack and then in ancestors.
    ///
    /// # Errors
    ///
    /// [`ContextError::ScopeNotFound`] if `scope` was not pushed on this
    /// context.
    pub fn get_parent_scope<S: Scope>(&self, scope: &Arc<S>) -> Result<Option<Arc<S>>, ContextError> {
        let below = {
            let scopes = self.inner.scopes.lock();
            let index = scopes
                .iter()
                .position(|entry| entry.is(scope))
                .ok_or(ContextError::ScopeNotFound {
                    scope: std::any::type_name::<S>(),
                    context: self.id(),
                })?;
            scopes[..index]
                .iter()
                .rev()
                .find_map(ScopeEntry::downcast::<S>)
        };
        match below {
            Some(found) => Ok(Some(found)),
            None => Ok(self.parent().and_then(Context::get_scope::<S>)),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Returns the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle.lock().state
    }

    /// Returns `true` once `close()` has started.
    pub fn is_ending(&self) -> bool {
        self.state() != LifecycleState::Open
    }

    /// Returns the number of outstanding holds.
    pub fn hold_count(&self) -> usize {
        self.inner.lifecycle.lock().hold_count
    }

    /// Ends every scope in reverse push order, deregisters from the parent and
    /// propagates the error/warning flags to it.
    ///
    /// A no-op while the context is held or once it is ending; safe to call
    /// repeatedly, re-entrantly, and from several threads.
    pub fn close(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state != LifecycleState::Open || lifecycle.hold_count > 0 {
                return;
            }
            lifecycle.state = LifecycleState::Ending;
        }

        let scopes = self.inner.scopes.lock().clone();
        for entry in scopes.iter().rev() {
            entry.hooks().on_scope_end(self);
        }

        if let Some(parent) = self.parent() {
            parent.inner.children.lock().remove(&self.id());
            if self.propagates_errors() {
                if self.has_errors() {
                    parent.set_has_error();
                }
                if self.has_warnings() {
                    parent.set_has_warnings();
                }
            }
        }

        self.inner.lifecycle.lock().state = LifecycleState::Closed;
        debug!(
            context_id = %self.id(),
            has_errors = self.has_errors(),
            has_warnings = self.has_warnings(),
            cancelled = self.is_cancelled(),
            "context closed"
        );
    }

    /// Defers closing until a matching [`Context::release`].
    pub fn hold(&self) {
        self.inner.lifecycle.lock().hold_count += 1;
    }

    /// Drops one hold; closes the context when the last hold is released.
    pub fn release(&self) {
        let should_close = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.hold_count == 0 {
                warn!(context_id = %self.id(), "release() without a matching hold(); ignored");
                return;
            }
            lifecycle.hold_count -= 1;
            lifecycle.hold_count == 0
        };
        if should_close {
            self.close();
        }
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Marks this operation cancelled.
    ///
    /// The first call runs this context's cancellation handlers, then
    /// forwards to the parent and to every open child. Later calls do
    /// nothing.
    pub fn set_cancelled(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(context_id = %self.id(), "context cancelled");

        let handlers = std::mem::take(&mut *self.inner.cancellation_handlers.lock());
        for handler in handlers {
            handler();
        }

        if let Some(parent) = self.parent() {
            parent.set_cancelled();
        }
        for child in self.live_children() {
            child.set_cancelled();
        }
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Registers `handler` to run once, when this context is first cancelled.
    ///
    /// Handlers registered after cancellation are dropped without running.
    pub fn add_cancellation_handler(&self, handler: impl FnOnce() + Send + 'static) {
        let mut handlers = self.inner.cancellation_handlers.lock();
        if self.is_cancelled() {
            return;
        }
        handlers.push(Box::new(handler));
    }

    /// Returns the number of children that are still open.
    pub fn child_count(&self) -> usize {
        self.live_children().len()
    }

    fn live_children(&self) -> Vec<Context> {
        let mut children = self.inner.children.lock();
        children.retain(|_, child| child.strong_count() > 0);
        children
            .values()
            .filter_map(Weak::upgrade)
            .map(|inner| Context { inner })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// Registers `sink` for events of type `T`.
    pub fn add_output_sink<T: Output>(&self, sink: impl OutputSink<T>) -> &Self {
        self.inner.sinks.lock().add::<T, _>(sink);
        self
    }

    /// Emits `output` to the sinks registered for its type on this context,
    /// most recent first, stopping at the first one that answers
    /// [`Propagation::Stop`]. If none does, the event travels to the parent,
    /// and so on up to the root.
    pub fn output<T: Output>(&self, output: T) {
        self.dispatch(TypeId::of::<T>(), &output);
    }

    fn dispatch(&self, type_id: TypeId, event: &dyn Any) {
        let mut current = Some(self);
        while let Some(context) = current {
            let propagation = {
                let _serial = context.inner.output_lock.lock();
                let sinks = context.inner.sinks.lock().snapshot(type_id);
                deliver(&sinks, event)
            };
            if propagation == Propagation::Stop {
                return;
            }
            current = context.parent();
        }
    }

    // -----------------------------------------------------------------------
    // Error state
    // -----------------------------------------------------------------------

    /// Sets the error flag. Propagated to the parent on close.
    pub fn set_has_error(&self) {
        self.inner.has_errors.store(true, Ordering::SeqCst);
    }

    /// Sets the warning flag. Propagated to the parent on close.
    pub fn set_has_warnings(&self) {
        self.inner.has_warnings.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if the error flag is set.
    pub fn has_errors(&self) -> bool {
        self.inner.has_errors.load(Ordering::SeqCst)
    }

    /// Returns `true` if the warning flag is set.
    pub fn has_warnings(&self) -> bool {
        self.inner.has_warnings.load(Ordering::SeqCst)
    }

    /// Controls whether the error/warning flags reach the parent on close.
    pub fn set_propagates_errors(&self, propagates: bool) {
        self.inner
            .propagates_errors
            .store(propagates, Ordering::SeqCst);
    }

    /// Returns whether the error/warning flags reach the parent on close.
    pub fn propagates_errors(&self) -> bool {
        self.inner.propagates_errors.load(Ordering::SeqCst)
    }

    /// `true` while there are no errors and no cancellation.
    pub fn should_continue(&self) -> bool {
        !self.has_errors() && !self.is_cancelled()
    }

    /// Returns the terminal result.
    ///
    /// Cancellation takes precedence over failure.
    ///
    /// # Errors
    ///
    /// [`ContextError::StillRunning`] if the context is still open and
    /// [`Context::should_continue`] is `true`.
    pub fn get_sync_result(&self) -> Result<SyncResult, ContextError> {
        if self.is_cancelled() {
            Ok(SyncResult::Cancelled)
        } else if self.has_errors() {
            Ok(SyncResult::Failure)
        } else if self.state() == LifecycleState::Open {
            Err(ContextError::StillRunning { context: self.id() })
        } else {
            Ok(SyncResult::Success)
        }
    }

    // -----------------------------------------------------------------------
    // Failure classification
    // -----------------------------------------------------------------------

    /// Absorbs a failure of work run under this context.
    ///
    /// Cancellations cancel the context. Anything else is logged, reported as
    /// an [`IssueOutput`] and sets the error flag.
    pub fn handle_exception(&self, description: &str, error: &anyhow::Error) {
        self.report_failure(description, error, false);
    }

    /// Like [`Context::handle_exception`], but sets the warning flag instead
    /// of the error flag.
    pub fn handle_exception_as_warning(&self, description: &str, error: &anyhow::Error) {
        self.report_failure(description, error, true);
    }

    fn report_failure(&self, description: &str, error: &anyhow::Error, as_warning: bool) {
        match classify(error) {
            Classification::Cancellation => {
                info!(context_id = %self.id(), description, error = %error, "operation cancelled");
                self.output(PrintOutput::new("Operation cancelled by user"));
                self.set_cancelled();
            }
            Classification::Error => {
                error!(context_id = %self.id(), description, error = ?error, "operation failed");
                let issue = if as_warning {
                    IssueOutput::warn(description)
                } else {
                    IssueOutput::error(description)
                };
                issue.submit(self);
                for cause in reportable_causes(error) {
                    self.output(PrintOutput::error(format!("because: {cause}")));
                }
            }
            Classification::Benign => {
                info!(context_id = %self.id(), description, error = %error, "operation failed");
                let message = error.to_string();
                if !message.is_empty() {
                    self.output(PrintOutput::error(message));
                }
                if as_warning {
                    self.set_has_warnings();
                } else {
                    self.set_has_error();
                }
            }
        }
    }
}

/// Non-owning handle to a [`Context`], for callbacks stored outside the
/// context that must not keep it alive.
#[derive(Clone)]
pub struct WeakContext {
    inner: Weak<Inner>,
}

impl WeakContext {
    /// Returns the context if it is still alive.
    pub fn upgrade(&self) -> Option<Context> {
        self.inner.upgrade().map(|inner| Context { inner })
    }
}

impl std::fmt::Debug for WeakContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakContext")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id())
            .field("parent", &self.parent().map(Context::id))
            .field("state", &self.state())
            .field("scopes", &*self.inner.scopes.lock())
            .field("sinks", &*self.inner.sinks.lock())
            .field("cancelled", &self.is_cancelled())
            .field("has_errors", &self.has_errors())
            .field("has_warnings", &self.has_warnings())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Scoped acquisition
// ---------------------------------------------------------------------------

/// Owns a [`Context`] and closes it when dropped, including while unwinding.
#[derive(Debug)]
pub struct ContextGuard {
    context: Context,
}

impl ContextGuard {
    /// Takes responsibility for closing `context`.
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Creates a child of `parent` (or a root) and guards it.
    pub fn enter(parent: Option<&Context>) -> Self {
        Self::new(Context::create_with(parent))
    }

    /// Returns the guarded context.
    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl std::ops::Deref for ContextGuard {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.context
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.context.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::IssueCategory;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    struct Named {
        name: &'static str,
        recorder: Arc<Recorder>,
    }

    impl Scope for Named {
        fn on_scope_begin(&self, _context: &Context) {
            self.recorder.events.lock().push(self.name);
        }

        fn on_scope_end(&self, _context: &Context) {
            self.recorder.events.lock().push(self.name);
        }
    }

    #[test]
    fn push_after_close_is_ignored() {
        let recorder = Arc::new(Recorder::default());
        let context = Context::create();
        context.close();
        context.push(Arc::new(Named {
            name: "late",
            recorder: Arc::clone(&recorder),
        }));
        assert!(recorder.events.lock().is_empty());
        assert!(context.get_scope::<Named>().is_none());
    }

    #[test]
    fn state_walks_open_to_closed() {
        let context = Context::create();
        assert_eq!(context.state(), LifecycleState::Open);
        context.close();
        assert_eq!(context.state(), LifecycleState::Closed);
        assert!(context.is_ending());
    }

    #[test]
    fn closing_deregisters_the_child() {
        let parent = Context::create();
        let child = Context::create_child(&parent);
        assert_eq!(parent.child_count(), 1);
        child.close();
        assert_eq!(parent.child_count(), 0);
    }

    #[test]
    fn dropped_children_are_forgotten() {
        let parent = Context::create();
        drop(Context::create_child(&parent));
        assert_eq!(parent.child_count(), 0);
    }

    #[test]
    fn child_of_cancelled_parent_starts_cancelled() {
        let parent = Context::create();
        parent.set_cancelled();
        let child = Context::create_child(&parent);
        assert!(child.is_cancelled());
    }

    #[test]
    fn handler_registered_after_cancel_never_runs() {
        let context = Context::create();
        context.set_cancelled();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        context.add_cancellation_handler(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        context.set_cancelled();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn release_without_hold_is_ignored() {
        let context = Context::create();
        context.release();
        assert_eq!(context.hold_count(), 0);
        assert_eq!(context.state(), LifecycleState::Open);
    }

    #[test]
    fn release_to_zero_closes_even_without_close_call() {
        let context = Context::create();
        context.hold();
        context.release();
        assert_eq!(context.state(), LifecycleState::Closed);
    }

    #[test]
    fn sync_result_available_early_when_failed() {
        let context = Context::create();
        context.set_has_error();
        assert_eq!(context.get_sync_result(), Ok(SyncResult::Failure));
        context.set_cancelled();
        assert_eq!(context.get_sync_result(), Ok(SyncResult::Cancelled));
    }

    #[test]
    fn submitted_issues_raise_flags() {
        let context = Context::create();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        context.add_output_sink::<IssueOutput>(move |issue: &IssueOutput| {
            sink_seen.lock().push(issue.category);
            Propagation::Stop
        });

        IssueOutput::warn("deprecated flag").submit(&context);
        assert!(context.has_warnings());
        assert!(!context.has_errors());

        IssueOutput::error("missing target").submit(&context);
        assert!(context.has_errors());
        assert_eq!(
            *seen.lock(),
            vec![IssueCategory::Warning, IssueCategory::Error]
        );
    }

    #[test]
    fn guard_closes_on_drop() {
        let context = {
            let guard = ContextGuard::enter(None);
            guard.context().clone()
        };
        assert_eq!(context.state(), LifecycleState::Closed);
    }
}
