//! Timing of phases and sub-phases.
//!
//! Every [`TimingScope`] measures the life of the context it is pushed on.
//! Nested timing scopes (on the same context or on descendants) report their
//! [`TimedEvent`] to the nearest enclosing timing scope; the outermost one
//! logs the whole tree and hands it to its [`TimingListener`]s.

use std::sync::Arc;
use std::time::{Duration, Instant};

use context::{run, Context, Scope, Timestamp};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

/// What kind of work a timed phase performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A build tool invocation.
    BuildInvocation,
    /// Fetching remote files ahead of use.
    Prefetching,
    /// Anything else.
    Other,
}

/// One measured phase and the phases nested inside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedEvent {
    /// Name of the phase.
    pub name: String,
    /// Kind of work the phase performed.
    pub event_type: EventType,
    /// Wall-clock time the phase began.
    pub started_at: Timestamp,
    /// How long the phase ran.
    pub duration: Duration,
    /// Whether the phase's context was cancelled when it ended.
    pub cancelled: bool,
    /// Phases timed inside this one, in completion order.
    pub children: Vec<TimedEvent>,
}

impl TimedEvent {
    /// `true` if no phase was timed inside this one.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// This event followed by all its descendants, depth first.
    pub fn flatten(&self) -> Vec<&TimedEvent> {
        let mut events = vec![self];
        for child in &self.children {
            events.extend(child.flatten());
        }
        events
    }

    /// Total time spent in `event_type` phases, counting only leaves so
    /// nested phases are not double counted.
    pub fn total_for(&self, event_type: EventType) -> Duration {
        self.flatten()
            .into_iter()
            .filter(|event| event.is_leaf() && event.event_type == event_type)
            .map(|event| event.duration)
            .sum()
    }
}

/// Receives the finished tree of an outermost [`TimingScope`].
pub trait TimingListener: Send + Sync + 'static {
    fn on_timing_complete(&self, event: &TimedEvent);
}

impl<F> TimingListener for F
where
    F: Fn(&TimedEvent) + Send + Sync + 'static,
{
    fn on_timing_complete(&self, event: &TimedEvent) {
        self(event)
    }
}

#[derive(Default)]
struct TimingState {
    started_at: Option<Timestamp>,
    start: Option<Instant>,
    children: Vec<TimedEvent>,
    result: Option<TimedEvent>,
}

/// Measures the lifetime of the context it is pushed on.
pub struct TimingScope {
    name: String,
    event_type: EventType,
    state: Mutex<TimingState>,
    listeners: Mutex<Vec<Arc<dyn TimingListener>>>,
}

impl TimingScope {
    /// Creates a scope timing a phase called `name`.
    pub fn new(name: impl Into<String>, event_type: EventType) -> Self {
        Self {
            name: name.into(),
            event_type,
            state: Mutex::new(TimingState::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Adds a listener notified when this scope ends as the outermost
    /// timing scope.
    #[must_use]
    pub fn with_listener(self, listener: impl TimingListener) -> Self {
        self.listeners.lock().push(Arc::new(listener));
        self
    }

    /// Name of the timed phase.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The measured event, once the scope has ended.
    pub fn result(&self) -> Option<TimedEvent> {
        self.state.lock().result.clone()
    }

    fn attach_child(&self, event: TimedEvent) {
        let mut state = self.state.lock();
        if state.result.is_some() {
            debug!(scope = %self.name, child = %event.name, "child timing finished after its parent");
            return;
        }
        state.children.push(event);
    }

    /// Finds the `Arc` this scope was pushed as, so the context can locate
    /// the timing scope enclosing it.
    fn enclosing(&self, context: &Context) -> Option<Arc<TimingScope>> {
        let me = context
            .get_scopes::<TimingScope>()
            .into_iter()
            .find(|scope| std::ptr::eq(Arc::as_ptr(scope), self))?;
        context.get_parent_scope(&me).ok().flatten()
    }
}

impl Scope for TimingScope {
    fn on_scope_begin(&self, _context: &Context) {
        let mut state = self.state.lock();
        state.started_at = Some(Timestamp::now());
        state.start = Some(Instant::now());
    }

    fn on_scope_end(&self, context: &Context) {
        let event = {
            let mut state = self.state.lock();
            let event = TimedEvent {
                name: self.name.clone(),
                event_type: self.event_type,
                started_at: state.started_at.unwrap_or_else(Timestamp::now),
                duration: state.start.map(|s| s.elapsed()).unwrap_or_default(),
                cancelled: context.is_cancelled(),
                children: std::mem::take(&mut state.children),
            };
            state.result = Some(event.clone());
            event
        };

        match self.enclosing(context) {
            Some(parent) => parent.attach_child(event),
            None => {
                for timed in event.flatten() {
                    info!(
                        context_id = %context.id(),
                        phase = %timed.name,
                        event_type = ?timed.event_type,
                        duration_ms = timed.duration.as_millis() as u64,
                        "phase timing"
                    );
                }
                let listeners = self.listeners.lock().clone();
                for listener in listeners {
                    listener.on_timing_complete(&event);
                }
            }
        }
    }
}

/// Runs `f` in a child of `context` timed by a new [`TimingScope`].
pub fn run_with_timing<T>(
    context: &Context,
    name: &str,
    event_type: EventType,
    f: impl FnOnce(&Context) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    run::push(Some(context), |child| {
        child.push(Arc::new(TimingScope::new(name, event_type)));
        f(child)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nested_phases_form_a_tree() {
        let finished = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&finished);
        let root = Context::create();
        root.push(Arc::new(
            TimingScope::new("Sync", EventType::Other).with_listener(move |event: &TimedEvent| {
                *slot.lock() = Some(event.clone());
            }),
        ));

        run_with_timing(&root, "Build", EventType::BuildInvocation, |build| {
            run_with_timing(build, "Fetch", EventType::Prefetching, |_| Ok(()))
        })
        .unwrap();
        run_with_timing(&root, "Index", EventType::Other, |_| Ok(())).unwrap();
        root.close();

        let tree = finished.lock().clone().expect("listener not called");
        let names: Vec<String> = tree.flatten().into_iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["Sync", "Build", "Fetch", "Index"]);
        assert!(!tree.children[0].is_leaf());
        assert!(tree.children[1].is_leaf());
    }

    #[test]
    fn scopes_on_one_context_nest() {
        let root = Context::create();
        let outer = Arc::new(TimingScope::new("outer", EventType::Other));
        let inner = Arc::new(TimingScope::new("inner", EventType::Prefetching));
        root.push(Arc::clone(&outer)).push(Arc::clone(&inner));
        root.close();

        let event = outer.result().unwrap();
        assert_eq!(event.children.len(), 1);
        assert_eq!(event.children[0].name, "inner");
        assert_eq!(
            event.total_for(EventType::Prefetching),
            inner.result().unwrap().duration
        );
    }

    #[test]
    fn cancelled_phase_is_marked() {
        let root = Context::create();
        let scope = Arc::new(TimingScope::new("Query", EventType::BuildInvocation));
        root.push(Arc::clone(&scope));
        root.set_cancelled();
        root.close();
        assert!(scope.result().unwrap().cancelled);
    }
}
