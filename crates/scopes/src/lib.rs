//! Built-in scopes for operations run under a [`context::Context`].
//!
//! Each scope is a cross-cutting behaviour a caller pushes onto a context
//! before running a phase. None of them perform I/O beyond `tracing`.
//!
//! | Module | Scope | Behaviour |
//! |--------|-------|-----------|
//! | [`timing`] | [`TimingScope`] | Measures phases and reports the nested timing tree |
//! | [`issues`] | [`IssueCollector`] | Records issues and summarises them on close |
//! | [`log`] | [`LogScope`] | Forwards console output to `tracing` |
//! | [`performance`] | [`PerformanceWarningScope`] | Batches performance warnings |
//! | [`summary`] | [`SummaryScope`] | Buffers summary lines until the phase ends |

pub mod issues;
pub mod log;
pub mod performance;
pub mod summary;
pub mod timing;

pub use issues::IssueCollector;
pub use log::LogScope;
pub use performance::PerformanceWarningScope;
pub use summary::SummaryScope;
pub use timing::{run_with_timing, EventType, TimedEvent, TimingListener, TimingScope};
