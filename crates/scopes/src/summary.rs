//! Buffering of summary lines until a phase finishes.

use std::sync::Arc;

use context::{Context, Propagation, Scope, SummaryOutput};
use parking_lot::Mutex;
use tracing::info;

/// Holds back [`SummaryOutput`]s emitted inside its context and replays them,
/// in order and with duplicates removed, to the parent context on close. On a
/// root context the lines are logged instead.
#[derive(Debug, Default)]
pub struct SummaryScope {
    lines: Arc<Mutex<Vec<SummaryOutput>>>,
}

impl SummaryScope {
    /// Creates a scope with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scope for SummaryScope {
    fn on_scope_begin(&self, context: &Context) {
        let lines = Arc::clone(&self.lines);
        context.add_output_sink::<SummaryOutput>(move |summary: &SummaryOutput| {
            let mut lines = lines.lock();
            let duplicate = summary.dedupe && lines.iter().any(|seen| seen.text == summary.text);
            if !duplicate {
                lines.push(summary.clone());
            }
            Propagation::Stop
        });
    }

    fn on_scope_end(&self, context: &Context) {
        let lines = std::mem::take(&mut *self.lines.lock());
        match context.parent() {
            Some(parent) => {
                for line in lines {
                    parent.output(line);
                }
            }
            None => {
                for line in lines {
                    info!(context_id = %context.id(), "{line}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn replays_deduplicated_lines_on_close() {
        let root = Context::create();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        root.add_output_sink::<SummaryOutput>(move |summary: &SummaryOutput| {
            sink.lock().push(summary.text.clone());
            Propagation::Stop
        });

        let phase = Context::create_child(&root);
        phase.push(Arc::new(SummaryScope::new()));
        phase.output(SummaryOutput::output("Build failed").dedupe());
        phase.output(SummaryOutput::output("Build failed").dedupe());
        phase.output(SummaryOutput::output("Sync took 12s"));
        assert!(seen.lock().is_empty());
        phase.close();

        assert_eq!(
            *seen.lock(),
            vec!["Build failed".to_string(), "Sync took 12s".to_string()]
        );
    }
}
