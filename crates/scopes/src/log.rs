//! Forwarding of console output to `tracing`.

use context::{Context, OutputKind, Propagation, PrintOutput, Scope, StatusOutput, SummaryOutput};
use tracing::{debug, error, info, trace};

/// Logs every [`PrintOutput`], [`StatusOutput`] and [`SummaryOutput`] that
/// reaches its context. Events keep propagating.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogScope;

impl Scope for LogScope {
    fn on_scope_begin(&self, context: &Context) {
        let id = context.id();
        context.add_output_sink::<PrintOutput>(move |line: &PrintOutput| {
            match line.kind {
                OutputKind::Normal => info!(context_id = %id, "{}", line.text),
                OutputKind::Log => debug!(context_id = %id, "{}", line.text),
                OutputKind::Error => error!(context_id = %id, "{}", line.text),
                OutputKind::Process => trace!(context_id = %id, "{}", line.text),
            }
            Propagation::Continue
        });
        context.add_output_sink::<StatusOutput>(move |status: &StatusOutput| {
            info!(context_id = %id, status = %status.status, "status");
            Propagation::Continue
        });
        context.add_output_sink::<SummaryOutput>(move |summary: &SummaryOutput| {
            if summary.is_error {
                error!(context_id = %id, "{summary}");
            } else {
                info!(context_id = %id, "{summary}");
            }
            Propagation::Continue
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn logged_output_keeps_propagating() {
        let root = Context::create();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        root.add_output_sink::<PrintOutput>(move |line: &PrintOutput| {
            sink.lock().push(line.text.clone());
            Propagation::Stop
        });

        let phase = Context::create_child(&root);
        phase.push(Arc::new(LogScope));
        phase.output(PrintOutput::error("compile failed"));
        phase.output(StatusOutput::new("Building"));

        assert_eq!(*lines.lock(), vec!["compile failed".to_string()]);
    }
}
