//! Gathering of performance warnings.

use std::sync::Arc;

use context::{Context, PerformanceWarning, PrintOutput, Propagation, Scope};
use parking_lot::Mutex;

/// Captures [`PerformanceWarning`]s so they are not shown piecemeal, and
/// prints them together when the context closes.
#[derive(Debug, Default)]
pub struct PerformanceWarningScope {
    warnings: Arc<Mutex<Vec<PerformanceWarning>>>,
}

impl PerformanceWarningScope {
    /// Creates a scope with no captured warnings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Warnings captured so far, in arrival order.
    pub fn warnings(&self) -> Vec<PerformanceWarning> {
        self.warnings.lock().clone()
    }
}

impl Scope for PerformanceWarningScope {
    fn on_scope_begin(&self, context: &Context) {
        let warnings = Arc::clone(&self.warnings);
        context.add_output_sink::<PerformanceWarning>(move |warning: &PerformanceWarning| {
            warnings.lock().push(warning.clone());
            Propagation::Stop
        });
    }

    fn on_scope_end(&self, context: &Context) {
        let warnings = self.warnings();
        if warnings.is_empty() {
            return;
        }
        context.output(PrintOutput::new("Performance warnings:"));
        for warning in warnings {
            context.output(PrintOutput::new(format!("  - {}", warning.text)));
        }
    }
}
