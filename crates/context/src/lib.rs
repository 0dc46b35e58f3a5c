//! Hierarchical scoped-operation contexts.
//!
//! Long multi-phase operations (project import, dependency resolution, build
//! log parsing) run under a tree of [`Context`]s. Each context carries
//! cancellation, error/warning state and typed output routing for one phase
//! and its sub-phases, and decorates caller-supplied work with lifecycle
//! semantics. It never schedules work itself.
//!
//! ## Architectural Layer
//!
//! **Core + port definitions.** This crate has no I/O dependencies. Concrete
//! progress indicators and log sinks live in infrastructure crates that
//! implement the traits defined here.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`context`] | [`Context`], [`ContextGuard`], lifecycle and cancellation |
//! | [`scope`] | The [`Scope`] trait |
//! | [`output`] | [`Output`], [`OutputSink`], [`Propagation`] and the sink registry |
//! | [`outputs`] | Built-in output events (`PrintOutput`, `IssueOutput`, …) |
//! | [`run`] | Helpers running work in a context that is always closed |
//! | [`task`] | [`ProgressIndicator`] port and the [`TaskScope`] bridge |
//! | [`outcome`] | [`Outcome`], a value-or-failure return type |
//! | [`errors`] | [`ContextError`], failure markers and classification |
//! | [`identifiers`] | Newtype identifiers |
//! | [`types`] | [`SyncResult`], [`Timestamp`] |
//!
//! ## Example
//!
//! ```
//! use context::{run, Context, PrintOutput, Propagation, SyncResult};
//!
//! let root = Context::create();
//! root.add_output_sink::<PrintOutput>(|line: &PrintOutput| {
//!     println!("{line}");
//!     Propagation::Stop
//! });
//!
//! let resolved = run::push(Some(&root), |phase| {
//!     phase.output(PrintOutput::new("Resolving dependencies"));
//!     Ok(3)
//! });
//! assert_eq!(resolved.unwrap(), 3);
//!
//! root.close();
//! assert_eq!(root.get_sync_result(), Ok(SyncResult::Success));
//! ```

pub mod context;
pub mod errors;
pub mod identifiers;
pub mod outcome;
pub mod output;
pub mod outputs;
pub mod run;
pub mod scope;
pub mod task;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use context::{Context, ContextGuard, LifecycleState, WeakContext};
pub use errors::{
    classify, is_cancellation, Cancelled, Classification, ContextError, ExecutionFailure,
    ExpectedFailure, ProcessCancelled,
};
pub use identifiers::{ContextId, RunId};
pub use outcome::Outcome;
pub use output::{Output, OutputSink, PassThrough, Propagation, Suppress};
pub use outputs::{
    IssueCategory, IssueOutput, OutputKind, PerformanceWarning, PrintOutput, StatusOutput,
    SummaryOutput, SummaryPrefix,
};
pub use scope::Scope;
pub use task::{ProgressIndicator, TaskScope};
pub use types::{SyncResult, Timestamp};
