//! Failure classification through `handle_exception` and the scope-running
//! helpers.

use std::sync::Arc;

use anyhow::anyhow;
use context::{
    run, Cancelled, Context, ExecutionFailure, ExpectedFailure, IssueCategory, IssueOutput,
    Outcome, PrintOutput, ProcessCancelled, Propagation, SyncResult,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Issue(IssueCategory, String),
    Line(String),
}

fn capture(context: &Context) -> Arc<Mutex<Vec<Seen>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let issues = Arc::clone(&seen);
    context.add_output_sink::<IssueOutput>(move |issue: &IssueOutput| {
        issues
            .lock()
            .push(Seen::Issue(issue.category, issue.message.clone()));
        Propagation::Stop
    });
    let lines = Arc::clone(&seen);
    context.add_output_sink::<PrintOutput>(move |line: &PrintOutput| {
        lines.lock().push(Seen::Line(line.text.clone()));
        Propagation::Stop
    });
    seen
}

#[test]
fn cancellation_is_reported_and_not_an_error() {
    let context = Context::create();
    let seen = capture(&context);

    context.handle_exception("Sync", &anyhow::Error::from(Cancelled));

    assert!(context.is_cancelled());
    assert!(!context.has_errors());
    assert_eq!(
        *seen.lock(),
        vec![Seen::Line("Operation cancelled by user".into())]
    );
}

#[test]
fn cancelled_process_is_cancellation() {
    let context = Context::create();
    context.handle_exception(
        "Build",
        &anyhow::Error::from(ProcessCancelled {
            command: "build //app:all".into(),
        }),
    );
    assert!(context.is_cancelled());
    assert!(!context.has_errors());
}

#[test]
fn unexpected_failure_reports_cause_chain() {
    let context = Context::create();
    let seen = capture(&context);

    let worker_failure = anyhow!("permission denied").context("reading BUILD file");
    let error = anyhow::Error::from(ExecutionFailure::new(worker_failure));
    context.handle_exception("Query sync failed", &error);

    assert!(context.has_errors());
    assert_eq!(
        *seen.lock(),
        vec![
            Seen::Issue(IssueCategory::Error, "Query sync failed".into()),
            Seen::Line("because: reading BUILD file".into()),
            Seen::Line("because: permission denied".into()),
        ]
    );
}

#[test]
fn warning_entry_point_sets_only_warnings() {
    let context = Context::create();
    let seen = capture(&context);

    context.handle_exception_as_warning("Optional lint pass failed", &anyhow!("lint crashed"));

    assert!(context.has_warnings());
    assert!(!context.has_errors());
    assert_eq!(
        seen.lock()[0],
        Seen::Issue(IssueCategory::Warning, "Optional lint pass failed".into())
    );
}

#[test]
fn benign_failure_prints_message_only() {
    let context = Context::create();
    let seen = capture(&context);

    context.handle_exception(
        "Build",
        &anyhow::Error::from(ExpectedFailure::new("2 targets failed to compile")),
    );

    assert!(context.has_errors());
    assert_eq!(
        *seen.lock(),
        vec![Seen::Line("2 targets failed to compile".into())]
    );
}

#[test]
fn push_outcome_absorbs_and_reports() {
    let root = Context::create();
    let seen = capture(&root);

    let outcome: Outcome<Vec<String>> = run::push_outcome(Some(&root), "Fetching artifacts", |_| {
        Err(anyhow!("remote cache unavailable"))
    });

    assert!(outcome.failure().is_some());
    assert!(root.has_errors());
    root.close();
    assert_eq!(root.get_sync_result(), Ok(SyncResult::Failure));
    assert_eq!(
        seen.lock().first(),
        Some(&Seen::Issue(IssueCategory::Error, "Fetching artifacts".into()))
    );
}

#[test]
fn run_root_operation_closes_root() {
    let mut captured = None;
    run::run_root_operation(|context| {
        context.set_has_warnings();
        captured = Some(context.clone());
    });
    let context = captured.unwrap();
    assert!(context.is_ending());
    assert_eq!(context.get_sync_result(), Ok(SyncResult::Success));
}
