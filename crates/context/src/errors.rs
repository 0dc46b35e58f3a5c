//! Error types and failure classification for the context hierarchy.
//!
//! [`ContextError`] covers misuse of the context API itself (asking for the
//! result of an operation that is still running, looking up a scope that was
//! never pushed). Failures of the *work* run under a context travel as
//! [`anyhow::Error`] and are classified by [`classify`] into cancellations,
//! errors and benign failures.
//!
//! The marker types in this module ([`Cancelled`], [`ProcessCancelled`],
//! [`ExpectedFailure`], [`ExecutionFailure`]) are recognised anywhere in an
//! error's cause chain, so wrapping them with `anyhow::Context` does not change
//! how they are classified.

use std::error::Error as StdError;

use thiserror::Error;

use crate::ContextId;

// ---------------------------------------------------------------------------
// API misuse
// ---------------------------------------------------------------------------

/// Errors returned by the context API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The terminal result was requested while the operation can still
    /// continue (no errors, not cancelled, not closed).
    #[error("Context {context} is still running; its result is not known yet")]
    StillRunning {
        /// The context that was queried.
        context: ContextId,
    },

    /// The scope passed to [`crate::Context::get_parent_scope`] is not on the
    /// context's stack.
    #[error("Scope {scope} is not pushed on context {context}")]
    ScopeNotFound {
        /// Type name of the scope that was looked up.
        scope: &'static str,
        /// The context that was searched.
        context: ContextId,
    },
}

// ---------------------------------------------------------------------------
// Failure markers
// ---------------------------------------------------------------------------

/// Cancellation signalled by the host environment.
///
/// Returning this (or any error whose chain contains it) from a unit of work
/// marks the context cancelled rather than failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// The user explicitly cancelled a long-running external process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("External process cancelled: {command}")]
pub struct ProcessCancelled {
    /// The command line (or a label for it) that was cancelled.
    pub command: String,
}

/// An expected, benign failure: the operation failed for a reason the user
/// is already aware of (a broken build, a missing input), not because of a
/// defect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExpectedFailure {
    /// Human-readable description of the failure.
    pub message: String,
    /// `true` when the failure is a consequence of the context having already
    /// been cancelled (e.g. a build tool killed mid-run).
    pub caused_by_cancellation: bool,
}

impl ExpectedFailure {
    /// Creates a benign failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            caused_by_cancellation: false,
        }
    }

    /// Creates a failure that only happened because the operation was cancelled.
    pub fn after_cancellation(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            caused_by_cancellation: true,
        }
    }
}

/// Wrapper for a failure that crossed a worker boundary (thread join, task
/// join). Carries no information of its own and is skipped when cause chains
/// are reported.
#[derive(Debug, Error)]
#[error("Execution failed")]
pub struct ExecutionFailure {
    #[source]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl ExecutionFailure {
    /// Wraps the failure raised by a worker.
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How [`crate::Context::handle_exception`] treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Host or user cancellation. Cancels the context; does not set the
    /// error flag.
    Cancellation,
    /// An unexpected failure. Logged at error level with its full cause chain.
    Error,
    /// An expected failure. Logged at info level.
    Benign,
}

/// Returns `true` if the chain of `error` contains a cancellation marker.
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<Cancelled>()
            || cause.is::<ProcessCancelled>()
            || cause
                .downcast_ref::<ExpectedFailure>()
                .is_some_and(|f| f.caused_by_cancellation)
    })
}

/// Classifies `error` by inspecting its whole cause chain.
pub fn classify(error: &anyhow::Error) -> Classification {
    if is_cancellation(error) {
        Classification::Cancellation
    } else if error.chain().any(|cause| cause.is::<ExpectedFailure>()) {
        Classification::Benign
    } else {
        Classification::Error
    }
}

/// Returns the messages of `error` and its causes worth reporting, outermost
/// first. [`ExecutionFailure`] wrappers are skipped.
pub(crate) fn reportable_causes(error: &anyhow::Error) -> Vec<String> {
    error
        .chain()
        .filter(|cause| !cause.is::<ExecutionFailure>())
        .map(|cause| cause.to_string())
        .collect()
}
