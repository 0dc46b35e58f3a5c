//! Typed output events and the per-context sink registry.
//!
//! Work running under a [`crate::Context`] reports progress and diagnostics by
//! calling [`crate::Context::output`] with any value implementing [`Output`].
//! Sinks are registered per concrete event type and only see events of exactly
//! that type. The registry key is the event's [`TypeId`], supplied through the
//! generic parameter at registration and dispatch call sites.
//!
//! ```text
//! child.output(e)
//!   → child sinks for type_of(e), most recent first
//!   → any Stop? ─ yes → done
//!              └ no  → parent.output(e) → … → root
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Marker for values that can be emitted through [`crate::Context::output`].
///
/// Implemented explicitly by each event type.
pub trait Output: Any + Send + Sync + 'static {}

/// Decision returned by an [`OutputSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Propagation {
    /// Let the event bubble to the parent context's sinks.
    Continue,
    /// Swallow the event at this level.
    Stop,
}

/// Handler for output events of type `T`.
pub trait OutputSink<T: Output>: Send + Sync + 'static {
    /// Called for every event of type `T` reaching the context the sink is
    /// registered on.
    fn on_output(&self, output: &T) -> Propagation;
}

impl<T, F> OutputSink<T> for F
where
    T: Output,
    F: Fn(&T) -> Propagation + Send + Sync + 'static,
{
    fn on_output(&self, output: &T) -> Propagation {
        self(output)
    }
}

/// Sink that observes nothing and lets every event through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassThrough;

impl<T: Output> OutputSink<T> for PassThrough {
    fn on_output(&self, _output: &T) -> Propagation {
        Propagation::Continue
    }
}

/// Sink that suppresses every event of its type at the context it is
/// registered on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Suppress;

impl<T: Output> OutputSink<T> for Suppress {
    fn on_output(&self, _output: &T) -> Propagation {
        Propagation::Stop
    }
}

// ---------------------------------------------------------------------------
// Registry (type-erased)
// ---------------------------------------------------------------------------

type ErasedSink = Arc<dyn Fn(&dyn Any) -> Propagation + Send + Sync>;

/// Multimap from event type to sinks, in registration order.
#[derive(Default)]
pub(crate) struct SinkRegistry {
    sinks: HashMap<TypeId, Vec<ErasedSink>>,
}

impl SinkRegistry {
    pub(crate) fn add<T: Output, S: OutputSink<T>>(&mut self, sink: S) {
        let erased: ErasedSink = Arc::new(move |event: &dyn Any| {
            match event.downcast_ref::<T>() {
                Some(event) => sink.on_output(event),
                None => Propagation::Continue,
            }
        });
        self.sinks.entry(TypeId::of::<T>()).or_default().push(erased);
    }

    /// Snapshot of the sinks registered for `type_id`, most recent first.
    pub(crate) fn snapshot(&self, type_id: TypeId) -> Vec<ErasedSink> {
        self.sinks
            .get(&type_id)
            .map(|sinks| sinks.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.sinks.values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkRegistry")
            .field("types", &self.sinks.len())
            .field("sinks", &self.len())
            .finish()
    }
}

/// Runs `sinks` in order until one answers [`Propagation::Stop`]; later sinks
/// do not see the event. Returns whether the event may travel on to the
/// parent context.
pub(crate) fn deliver(sinks: &[ErasedSink], event: &dyn Any) -> Propagation {
    for sink in sinks {
        if sink(event) == Propagation::Stop {
            return Propagation::Stop;
        }
    }
    Propagation::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, PartialEq)]
    struct Ping(u32);
    impl Output for Ping {}

    #[derive(Debug)]
    struct Pong;
    impl Output for Pong {}

    #[test]
    fn snapshot_is_most_recent_first() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SinkRegistry::default();
        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            registry.add::<Ping, _>(move |_: &Ping| {
                seen.lock().push(label);
                Propagation::Continue
            });
        }

        let sinks = registry.snapshot(TypeId::of::<Ping>());
        assert_eq!(deliver(&sinks, &Ping(1)), Propagation::Continue);
        assert_eq!(*seen.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn sinks_only_see_their_own_type() {
        let mut registry = SinkRegistry::default();
        registry.add::<Ping, _>(Suppress);
        assert!(registry.snapshot(TypeId::of::<Pong>()).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stop_hides_event_from_older_sinks() {
        let calls = Arc::new(Mutex::new(0));
        let mut registry = SinkRegistry::default();
        let counter = Arc::clone(&calls);
        registry.add::<Ping, _>(move |_: &Ping| {
            *counter.lock() += 1;
            Propagation::Continue
        });
        registry.add::<Ping, _>(Suppress);

        let sinks = registry.snapshot(TypeId::of::<Ping>());
        assert_eq!(deliver(&sinks, &Ping(2)), Propagation::Stop);
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn pass_through_continues() {
        assert_eq!(PassThrough.on_output(&Pong), Propagation::Continue);
    }
}
