//! Collection of submitted issues.

use std::sync::Arc;

use context::{Context, IssueCategory, IssueOutput, Propagation, Scope, SummaryOutput};
use parking_lot::Mutex;

/// Records every [`IssueOutput`] reaching its context and summarises them
/// when the context closes. Issues keep propagating to the parent.
#[derive(Debug, Default)]
pub struct IssueCollector {
    issues: Arc<Mutex<Vec<IssueOutput>>>,
}

impl IssueCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues collected so far, in arrival order.
    pub fn issues(&self) -> Vec<IssueOutput> {
        self.issues.lock().clone()
    }

    /// Number of collected errors.
    pub fn error_count(&self) -> usize {
        self.count(IssueCategory::Error)
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.count(IssueCategory::Warning)
    }

    fn count(&self, category: IssueCategory) -> usize {
        self.issues
            .lock()
            .iter()
            .filter(|issue| issue.category == category)
            .count()
    }
}

impl Scope for IssueCollector {
    fn on_scope_begin(&self, context: &Context) {
        let issues = Arc::clone(&self.issues);
        context.add_output_sink::<IssueOutput>(move |issue: &IssueOutput| {
            issues.lock().push(issue.clone());
            Propagation::Continue
        });
    }

    fn on_scope_end(&self, context: &Context) {
        let errors = self.error_count();
        let warnings = self.warning_count();
        if errors == 0 && warnings == 0 {
            return;
        }
        let text = format!("{}, {}", plural(errors, "error"), plural(warnings, "warning"));
        let summary = if errors > 0 {
            SummaryOutput::error(text)
        } else {
            SummaryOutput::output(text)
        };
        context.output(summary.dedupe());
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_and_summarises() {
        let root = Context::create();
        let summaries = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&summaries);
        root.add_output_sink::<SummaryOutput>(move |summary: &SummaryOutput| {
            sink.lock().push((summary.text.clone(), summary.is_error));
            Propagation::Stop
        });

        let phase = Context::create_child(&root);
        let collector = Arc::new(IssueCollector::new());
        phase.push(Arc::clone(&collector));
        IssueOutput::error("cyclic dependency").submit(&phase);
        IssueOutput::warn("unused target").submit(&phase);
        IssueOutput::warn("deprecated rule").submit(&phase);
        IssueOutput::note("cache warm").submit(&phase);
        phase.close();

        assert_eq!(collector.error_count(), 1);
        assert_eq!(collector.warning_count(), 2);
        assert_eq!(collector.issues().len(), 4);
        assert_eq!(
            *summaries.lock(),
            vec![("1 error, 2 warnings".to_string(), true)]
        );
        assert!(root.has_errors());
    }

    #[test]
    fn silent_when_clean() {
        let root = Context::create();
        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        root.add_output_sink::<SummaryOutput>(move |_: &SummaryOutput| {
            *sink.lock() += 1;
            Propagation::Stop
        });
        root.push(Arc::new(IssueCollector::new()));
        root.close();
        assert_eq!(*seen.lock(), 0);
    }
}
