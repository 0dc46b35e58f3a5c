//! Bridge between an external cancellable progress indicator and a context.
//!
//! [`ProgressIndicator`] is the port an infrastructure crate implements for
//! whatever progress primitive the host provides. [`TaskScope`] wires one into
//! a context: status output becomes progress text, and cancellation flows in
//! both directions.

use std::sync::Arc;

use crate::{Cancelled, Context, Propagation, Scope, StatusOutput};

/// A host-provided, cancellable progress indicator.
pub trait ProgressIndicator: Send + Sync + 'static {
    /// Replaces the progress text.
    fn set_text(&self, text: &str);

    /// Sets completion in `[0.0, 1.0]`.
    fn set_fraction(&self, fraction: f64);

    /// Requests cancellation of the task the indicator tracks.
    fn cancel(&self);

    /// Returns `true` once cancellation has been requested.
    fn is_cancelled(&self) -> bool;

    /// Registers `callback` to run once when the indicator is cancelled. Runs
    /// it immediately if the indicator is already cancelled.
    fn on_cancel(&self, callback: Box<dyn FnOnce() + Send + 'static>);

    /// Fails with [`Cancelled`] if cancellation has been requested.
    ///
    /// # Errors
    ///
    /// [`Cancelled`] once the indicator is cancelled.
    fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Scope exposing a [`ProgressIndicator`] to the work running in a context.
pub struct TaskScope {
    indicator: Arc<dyn ProgressIndicator>,
}

impl TaskScope {
    /// Wraps `indicator`.
    pub fn new(indicator: Arc<dyn ProgressIndicator>) -> Self {
        Self { indicator }
    }

    /// The wrapped indicator.
    pub fn task(&self) -> &Arc<dyn ProgressIndicator> {
        &self.indicator
    }
}

impl Scope for TaskScope {
    fn on_scope_begin(&self, context: &Context) {
        let indicator = Arc::clone(&self.indicator);
        context.add_output_sink::<StatusOutput>(move |status: &StatusOutput| {
            indicator.set_text(&status.status);
            Propagation::Continue
        });

        let indicator = Arc::clone(&self.indicator);
        context.add_cancellation_handler(move || indicator.cancel());

        let weak = context.downgrade();
        self.indicator.on_cancel(Box::new(move || {
            if let Some(context) = weak.upgrade() {
                context.set_cancelled();
            }
        }));
    }

    fn on_scope_end(&self, context: &Context) {
        if context.should_continue() {
            self.indicator.set_fraction(1.0);
        }
    }
}

impl std::fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScope")
            .field("cancelled", &self.indicator.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeIndicator {
        text: Mutex<String>,
        fraction: Mutex<f64>,
        cancelled: AtomicBool,
        callbacks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    }

    impl ProgressIndicator for FakeIndicator {
        fn set_text(&self, text: &str) {
            *self.text.lock() = text.to_string();
        }

        fn set_fraction(&self, fraction: f64) {
            *self.fraction.lock() = fraction;
        }

        fn cancel(&self) {
            if !self.cancelled.swap(true, Ordering::SeqCst) {
                let callbacks = std::mem::take(&mut *self.callbacks.lock());
                for callback in callbacks {
                    callback();
                }
            }
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }

        fn on_cancel(&self, callback: Box<dyn FnOnce() + Send + 'static>) {
            if self.is_cancelled() {
                callback();
            } else {
                self.callbacks.lock().push(callback);
            }
        }
    }

    #[test]
    fn status_output_becomes_progress_text() {
        let indicator = Arc::new(FakeIndicator::default());
        let context = Context::create();
        context.push(Arc::new(TaskScope::new(indicator.clone())));
        context.output(StatusOutput::new("Building targets"));
        assert_eq!(*indicator.text.lock(), "Building targets");
        context.close();
        assert_eq!(*indicator.fraction.lock(), 1.0);
    }

    #[test]
    fn indicator_cancellation_cancels_context() {
        let indicator = Arc::new(FakeIndicator::default());
        let context = Context::create();
        context.push(Arc::new(TaskScope::new(indicator.clone())));
        indicator.cancel();
        assert!(context.is_cancelled());
        context.close();
        assert_eq!(*indicator.fraction.lock(), 0.0);
    }

    #[test]
    fn context_cancellation_cancels_indicator() {
        let indicator = Arc::new(FakeIndicator::default());
        let context = Context::create();
        context.push(Arc::new(TaskScope::new(indicator.clone())));
        context.set_cancelled();
        assert!(indicator.is_cancelled());
        assert!(indicator.check_cancelled().is_err());
    }

    #[test]
    fn scope_exposes_task_to_consumers() {
        let indicator = Arc::new(FakeIndicator::default());
        let context = Context::create();
        context.push(Arc::new(TaskScope::new(indicator)));
        let child = Context::create_child(&context);
        let task = child.get_scope::<TaskScope>().map(|scope| Arc::clone(scope.task()));
        assert!(task.is_some_and(|task| !task.is_cancelled()));
    }
}
