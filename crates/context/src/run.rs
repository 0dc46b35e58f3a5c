//! Helpers that run a unit of work inside a freshly created context and
//! guarantee the context is closed on every exit path.
//!
//! A scoped *function* is `FnOnce(&Context) -> anyhow::Result<T>`; a scoped
//! *operation* is `FnOnce(&Context)`. Failures are recorded on the context
//! and then handed back to the caller: an `Err` is returned unchanged, a
//! panic is resumed after the context has been closed.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

use tracing::{error, info_span};

use crate::errors::is_cancellation;
use crate::{Context, ContextGuard, Outcome};

/// Runs `f` under a new root context.
pub fn run_root<T>(f: impl FnOnce(&Context) -> anyhow::Result<T>) -> anyhow::Result<T> {
    push(None, f)
}

/// Runs `op` under a new root context.
pub fn run_root_operation(op: impl FnOnce(&Context)) {
    push_operation(None, op)
}

/// Runs `f` under a new child of `parent` (or a root when `parent` is `None`).
///
/// If `f` fails with a cancellation the context is marked cancelled; any
/// other failure sets the error flag and is logged. The failure is returned
/// either way, after the context has been closed.
pub fn push<T>(
    parent: Option<&Context>,
    f: impl FnOnce(&Context) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    run_guarded(parent, |context| {
        let result = f(context);
        if let Err(e) = &result {
            record_failure(context, e);
        }
        result
    })
}

/// Runs `op` under a new child of `parent` (or a root when `parent` is `None`).
pub fn push_operation(parent: Option<&Context>, op: impl FnOnce(&Context)) {
    run_guarded(parent, op)
}

/// Runs `f` under a new child of `parent`, capturing its failure instead of
/// returning it.
///
/// The failure goes through [`Context::handle_exception`] with `description`,
/// so it is classified, reported as output and reflected in the flags.
pub fn push_outcome<T>(
    parent: Option<&Context>,
    description: &str,
    f: impl FnOnce(&Context) -> anyhow::Result<T>,
) -> Outcome<T> {
    run_guarded(parent, |context| match f(context) {
        Ok(value) => Outcome::of(value),
        Err(e) => {
            context.handle_exception(description, &e);
            Outcome::error(e)
        }
    })
}

fn record_failure(context: &Context, e: &anyhow::Error) {
    if is_cancellation(e) {
        context.set_cancelled();
    } else {
        context.set_has_error();
        error!(context_id = %context.id(), error = ?e, "scoped function failed");
    }
}

fn run_guarded<R>(parent: Option<&Context>, body: impl FnOnce(&Context) -> R) -> R {
    let guard = ContextGuard::enter(parent);
    let span = info_span!("context", context_id = %guard.id());
    let outcome = {
        let _entered = span.enter();
        catch_unwind(AssertUnwindSafe(|| body(guard.context())))
    };
    match outcome {
        Ok(value) => value,
        Err(panic) => {
            guard.set_has_error();
            error!(context_id = %guard.id(), "scoped function panicked");
            drop(guard);
            resume_unwind(panic)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cancelled, LifecycleState, SyncResult};
    use anyhow::anyhow;

    #[test]
    fn value_is_returned_and_context_closed() {
        let mut seen = None;
        let value = run_root(|context| {
            seen = Some(context.clone());
            Ok(42)
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(seen.unwrap().state(), LifecycleState::Closed);
    }

    #[test]
    fn cancellation_marks_cancelled_not_failed() {
        let parent = Context::create();
        let result: anyhow::Result<()> = push(Some(&parent), |_| Err(Cancelled.into()));
        assert!(result.is_err());
        assert!(parent.is_cancelled());
        assert!(!parent.has_errors());
    }

    #[test]
    fn outcome_captures_failure() {
        let parent = Context::create();
        let outcome: Outcome<u32> = push_outcome(Some(&parent), "Resolving targets", |_| {
            Err(anyhow!("no such target"))
        });
        assert!(!outcome.is_ok());
        assert!(parent.has_errors());
        parent.close();
        assert_eq!(parent.get_sync_result(), Ok(SyncResult::Failure));
    }

    #[test]
    fn panics_close_the_context_and_resume() {
        let parent = Context::create();
        let child_slot = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let slot = std::sync::Arc::clone(&child_slot);
        let parent_ref = &parent;
        let caught = std::panic::catch_unwind(AssertUnwindSafe(move || {
            push_operation(Some(parent_ref), |context| {
                *slot.lock() = Some(context.clone());
                panic!("scope exploded");
            })
        }));
        assert!(caught.is_err());
        let child: Context = child_slot.lock().take().unwrap();
        assert_eq!(child.state(), LifecycleState::Closed);
        assert!(parent.has_errors());
    }
}
