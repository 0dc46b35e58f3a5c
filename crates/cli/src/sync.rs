//! The simulated multi-phase project sync.
//!
//! | Phase | Context | Work |
//! |-------|---------|------|
//! | Query | child of the sync context | resolves the configured targets |
//! | Build | child of the sync context, one held grandchild per target | builds targets on a bounded pool of blocking workers |
//! | Index | child of the sync context | indexes whatever was built |
//!
//! Every phase runs under a timing scope; issues, summaries and performance
//! warnings are collected on the sync context and rendered by the [`Console`]
//! on the root.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use context::{
    run, Cancelled, Context, ContextGuard, ExpectedFailure, IssueOutput, Outcome,
    PerformanceWarning, PrintOutput, RunId, StatusOutput, SummaryOutput, SyncResult, TaskScope,
};
use parking_lot::Mutex;
use progress::TrackedProgress;
use scopes::{
    run_with_timing, EventType, IssueCollector, LogScope, PerformanceWarningScope, SummaryScope,
    TimedEvent, TimingScope,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, info_span, Instrument};

use crate::config::CliConfig;
use crate::console::Console;

/// How often a simulated build checks for cancellation.
const CANCELLATION_POLL: Duration = Duration::from_millis(10);

/// Final state of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// The target built.
    Built,
    /// The build ran and failed.
    Failed,
    /// The build never ran or was cancelled.
    Skipped,
}

/// What a sync run produced.
#[derive(Debug)]
pub struct SyncReport {
    /// Identifier of this run, also recorded on the `sync` span.
    pub run_id: RunId,
    /// Terminal result of the whole sync.
    pub result: SyncResult,
    /// Every configured target with its final status, sorted by name.
    pub targets: Vec<(String, TargetStatus)>,
    /// Number of targets indexed, if the index phase completed.
    pub indexed: Option<usize>,
    /// Error issues submitted during the sync.
    pub errors: usize,
    /// Warning issues submitted during the sync.
    pub warnings: usize,
    /// Timing tree of the run, rooted at the `Sync` phase.
    pub timing: Option<TimedEvent>,
}

impl SyncReport {
    /// Final status of `target`, if it was configured.
    pub fn status_of(&self, target: &str) -> Option<TargetStatus> {
        self.targets
            .iter()
            .find(|(name, _)| name == target)
            .map(|(_, status)| *status)
    }

    fn built(&self) -> usize {
        self.targets
            .iter()
            .filter(|(_, status)| *status == TargetStatus::Built)
            .count()
    }
}

/// Runs the whole sync and closes every context it created.
///
/// # Errors
///
/// Only infrastructure failures (no runtime for the deadline, an unknown
/// result). Failures of the sync itself are reported through
/// [`SyncReport::result`].
pub async fn run_sync(config: &CliConfig, console: Console) -> anyhow::Result<SyncReport> {
    let run_id = RunId::new_random();
    let span = info_span!("sync", %run_id, project = %config.project);
    run_sync_inner(config, console, run_id).instrument(span).await
}

async fn run_sync_inner(
    config: &CliConfig,
    console: Console,
    run_id: RunId,
) -> anyhow::Result<SyncReport> {
    let progress = Arc::new(TrackedProgress::new(format!("Syncing {}", config.project)));
    let deadline = config
        .deadline_secs
        .map(|secs| progress.with_deadline(Duration::from_secs(secs)))
        .transpose()?;

    let timing = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&timing);
    let root = Context::create();
    root.push(Arc::new(console))
        .push(Arc::new(TaskScope::new(progress.clone())))
        .push(Arc::new(TimingScope::new("Sync", EventType::Other).with_listener(
            move |event: &TimedEvent| *slot.lock() = Some(event.clone()),
        )));

    let issues = Arc::new(IssueCollector::new());
    let (targets, indexed) = {
        let sync = ContextGuard::enter(Some(&root));
        // LogScope last: it must see summaries before SummaryScope holds them back.
        sync.push(Arc::new(SummaryScope::new()))
            .push(Arc::clone(&issues))
            .push(Arc::new(PerformanceWarningScope::new()))
            .push(Arc::new(LogScope));
        sync.output(PrintOutput::new(format!("Syncing project {}", config.project)));

        let resolved = query_phase(&sync, config);
        let targets = match resolved {
            Some(resolved) => build_phase(&sync, config, resolved).await,
            None => Vec::new(),
        };
        let indexed = index_phase(&sync, &targets);
        (targets, indexed)
    };
    root.close();

    if let Some(deadline) = deadline {
        deadline.abort();
    }

    let result = root
        .get_sync_result()
        .context("root context did not finish")?;
    let mut report = SyncReport {
        run_id,
        result,
        targets,
        indexed: indexed.value().copied(),
        errors: issues.error_count(),
        warnings: issues.warning_count(),
        timing: timing.lock().take(),
    };
    if report.result == SyncResult::Failure && config.keep_going && report.built() > 0 {
        report.result = SyncResult::PartialSuccess;
    }
    info!(result = %report.result, errors = report.errors, warnings = report.warnings, "sync finished");
    Ok(report)
}

fn query_phase(sync: &Context, config: &CliConfig) -> Option<Vec<String>> {
    let resolved = run_with_timing(sync, "Query", EventType::Other, |query| {
        query.output(StatusOutput::new("Querying targets"));
        for target in &config.targets {
            query.output(PrintOutput::log(format!("Resolved {target}")));
        }
        Ok(config.targets.clone())
    });
    match resolved {
        Ok(targets) => Some(targets),
        Err(err) => {
            sync.handle_exception("Query failed", &err);
            None
        }
    }
}

/// Builds every target in its own held child context. Each child is closed
/// immediately and finishes closing when its worker releases it. The phase
/// context is closed even if this future is dropped part way.
async fn build_phase(
    sync: &Context,
    config: &CliConfig,
    targets: Vec<String>,
) -> Vec<(String, TargetStatus)> {
    let build = ContextGuard::enter(Some(sync));
    build.push(Arc::new(TimingScope::new("Build", EventType::BuildInvocation)));
    build.output(StatusOutput::new(format!("Building {} targets", targets.len())));

    let permits = Arc::new(Semaphore::new(config.workers));
    let mut workers = JoinSet::new();
    for target in targets {
        let context = Context::create_child(build.context());
        context.push(Arc::new(TimingScope::new(target.clone(), EventType::BuildInvocation)));
        context.hold();
        context.close();

        let job = BuildJob {
            target,
            context,
            phase: build.context().clone(),
            config: config.clone(),
        };
        let permits = Arc::clone(&permits);
        workers.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let target = job.target.clone();
            let status = tokio::task::spawn_blocking(move || job.run()).await;
            (target, status)
        });
    }

    let mut statuses = Vec::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((target, Ok(status))) => statuses.push((target, status)),
            Ok((target, Err(err))) => {
                build.handle_exception(
                    &format!("Build worker for {target} crashed"),
                    &anyhow::Error::from(err),
                );
                statuses.push((target, TargetStatus::Failed));
            }
            Err(err) => build.handle_exception("Build worker crashed", &anyhow::Error::from(err)),
        }
    }
    statuses.sort_by(|a, b| a.0.cmp(&b.0));
    statuses
}

struct BuildJob {
    target: String,
    context: Context,
    phase: Context,
    config: CliConfig,
}

impl BuildJob {
    fn run(self) -> TargetStatus {
        let held = Held(self.context.clone());
        if self.phase.is_cancelled() || (!self.config.keep_going && self.phase.has_errors()) {
            held.0.output(PrintOutput::log(format!("Skipping {}", self.target)));
            return TargetStatus::Skipped;
        }
        match self.build() {
            Ok(()) => {
                held.0.output(PrintOutput::log(format!("Built {}", self.target)));
                TargetStatus::Built
            }
            Err(err) => {
                held.0
                    .handle_exception(&format!("Build of {} failed", self.target), &err);
                if held.0.is_cancelled() {
                    TargetStatus::Skipped
                } else {
                    TargetStatus::Failed
                }
            }
        }
    }

    fn build(&self) -> anyhow::Result<()> {
        let context = &self.context;
        let started = Instant::now();
        context.output(StatusOutput::new(format!("Building {}", self.target)));
        simulate_work(context, Duration::from_millis(self.config.build_millis))?;

        let build_file = build_file_of(&self.target);
        if self.config.warn_targets.contains(&self.target) {
            IssueOutput::warn("deprecated attribute 'legacy_create_init'")
                .in_file(build_file.clone())
                .at(12, 5)
                .submit(context);
        }
        let elapsed = started.elapsed();
        if elapsed >= Duration::from_millis(self.config.slow_build_millis) {
            context.output(PerformanceWarning::new(format!(
                "{} took {} ms to build",
                self.target,
                elapsed.as_millis()
            )));
        }
        if self.config.fail_targets.contains(&self.target) {
            IssueOutput::error("undefined symbol 'configure'")
                .in_file(build_file)
                .at(4, 1)
                .submit(context);
            return Err(ExpectedFailure::new(format!("{} failed to compile", self.target)).into());
        }
        Ok(())
    }
}

/// Releases the hold on a target context, including when the build panics.
struct Held(Context);

impl Drop for Held {
    fn drop(&mut self) {
        self.0.release();
    }
}

fn simulate_work(context: &Context, duration: Duration) -> Result<(), Cancelled> {
    let deadline = Instant::now() + duration;
    loop {
        if context.is_cancelled() {
            return Err(Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep(CANCELLATION_POLL.min(deadline - now));
    }
}

fn build_file_of(target: &str) -> String {
    let package = target
        .trim_start_matches("//")
        .split(':')
        .next()
        .unwrap_or_default();
    if package.is_empty() {
        "BUILD".to_string()
    } else {
        format!("{package}/BUILD")
    }
}

fn index_phase(sync: &Context, targets: &[(String, TargetStatus)]) -> Outcome<usize> {
    if sync.is_cancelled() {
        return Outcome::error(Cancelled);
    }
    let built: Vec<&str> = targets
        .iter()
        .filter(|(_, status)| *status == TargetStatus::Built)
        .map(|(name, _)| name.as_str())
        .collect();
    run::push_outcome(Some(sync), "Indexing failed", |index| {
        index.push(Arc::new(TimingScope::new("Index", EventType::Other)));
        index.output(StatusOutput::new("Indexing"));
        for target in &built {
            index.output(PrintOutput::log(format!("Indexed {target}")));
        }
        index.output(SummaryOutput::output(format!("Indexed {} targets", built.len())).dedupe());
        Ok(built.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::SharedBuffer;
    use pretty_assertions::assert_eq;

    fn config(targets: &[&str]) -> CliConfig {
        CliConfig {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            build_millis: 5,
            ..CliConfig::default()
        }
    }

    #[test]
    fn build_file_follows_package() {
        assert_eq!(build_file_of("//app/core:lib"), "app/core/BUILD");
        assert_eq!(build_file_of("//:root"), "BUILD");
    }

    #[tokio::test]
    async fn abandoned_build_phase_closes_its_context() {
        let sync = Context::create();
        let mut config = config(&["//a:a"]);
        config.build_millis = 200;
        let targets = config.targets.clone();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            build_phase(&sync, &config, targets),
        )
        .await;

        assert!(abandoned.is_err());
        assert_eq!(sync.child_count(), 0);
    }

    #[tokio::test]
    async fn clean_sync_succeeds() {
        let buffer = SharedBuffer::new();
        let report = run_sync(&config(&["//a:a", "//b:b"]), Console::new(false, buffer.clone()))
            .await
            .unwrap();

        assert_eq!(report.result, SyncResult::Success);
        assert_eq!(report.indexed, Some(2));
        assert_eq!(report.status_of("//a:a"), Some(TargetStatus::Built));
        let timing = report.timing.expect("timing tree");
        let phases: Vec<&str> = timing.children.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(phases, vec!["Query", "Build", "Index"]);
        assert_eq!(timing.children[1].children.len(), 2);
        assert!(buffer.lines().iter().any(|line| line.ends_with("Indexed 2 targets")));
    }

    #[tokio::test]
    async fn failed_target_with_keep_going_is_partial_success() {
        let mut config = config(&["//a:a", "//b:b"]);
        config.fail_targets = vec!["//b:b".to_string()];
        config.warn_targets = vec!["//a:a".to_string()];
        let buffer = SharedBuffer::new();

        let report = run_sync(&config, Console::new(false, buffer.clone())).await.unwrap();

        assert_eq!(report.result, SyncResult::PartialSuccess);
        assert_eq!(report.status_of("//b:b"), Some(TargetStatus::Failed));
        assert_eq!((report.errors, report.warnings), (1, 1));
        let lines = buffer.lines();
        assert!(lines.contains(&"ERROR: b/BUILD:4:1: undefined symbol 'configure'".to_string()));
        assert!(lines.contains(&"error: //b:b failed to compile".to_string()));
        assert!(lines.iter().any(|line| line.ends_with("1 error, 1 warning")));
    }

    #[tokio::test]
    async fn slow_builds_report_performance_warnings() {
        let mut config = config(&["//a:a"]);
        config.slow_build_millis = 0;
        let buffer = SharedBuffer::new();

        run_sync(&config, Console::new(false, buffer.clone())).await.unwrap();

        let lines = buffer.lines();
        let header = lines
            .iter()
            .position(|line| line == "Performance warnings:")
            .expect("header printed");
        assert!(lines[header + 1].starts_with("  - //a:a took"));
    }

    #[tokio::test]
    async fn deadline_cancels_the_sync() {
        let mut config = config(&["//a:a", "//b:b"]);
        config.build_millis = 5_000;
        config.deadline_secs = Some(0);

        let report = run_sync(&config, Console::new(false, SharedBuffer::new()))
            .await
            .unwrap();

        assert_eq!(report.result, SyncResult::Cancelled);
        assert_eq!(report.indexed, None);
        assert!(report.timing.is_some_and(|timing| timing.cancelled));
    }
}
