//! Terminal rendering of pipeline output.

use std::fmt::Display;
use std::io::Write;
use std::sync::Arc;

use context::{
    Context, IssueCategory, IssueOutput, OutputKind, PrintOutput, Propagation, Scope,
    SummaryOutput,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

/// Scope that writes every [`PrintOutput`], [`IssueOutput`] and
/// [`SummaryOutput`] reaching its context to a writer, as text or as JSON
/// lines. Events stop here.
pub struct Console {
    json: bool,
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    /// Renders to `out`, as JSON lines when `json` is set.
    pub fn new(json: bool, out: impl Write + Send + 'static) -> Self {
        Self {
            json,
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    /// Renders to standard output.
    pub fn stdout(json: bool) -> Self {
        Self::new(json, std::io::stdout())
    }
}

impl Scope for Console {
    fn on_scope_begin(&self, context: &Context) {
        let writer = Writer {
            json: self.json,
            out: Arc::clone(&self.out),
        };

        let lines = writer.clone();
        context.add_output_sink::<PrintOutput>(move |line: &PrintOutput| {
            let text = match line.kind {
                OutputKind::Normal => line.text.clone(),
                OutputKind::Log => format!("  {}", line.text),
                OutputKind::Error => format!("error: {}", line.text),
                OutputKind::Process => format!("> {}", line.text),
            };
            lines.write("print", line, text);
            Propagation::Stop
        });

        let issues = writer.clone();
        context.add_output_sink::<IssueOutput>(move |issue: &IssueOutput| {
            let label = match issue.category {
                IssueCategory::Error => "ERROR",
                IssueCategory::Warning => "WARNING",
                IssueCategory::Note => "NOTE",
                IssueCategory::Info => "INFO",
            };
            issues.write("issue", issue, format!("{label}: {issue}"));
            Propagation::Stop
        });

        context.add_output_sink::<SummaryOutput>(move |summary: &SummaryOutput| {
            writer.write("summary", summary, summary);
            Propagation::Stop
        });
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").field("json", &self.json).finish()
    }
}

#[derive(Clone)]
struct Writer {
    json: bool,
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

#[derive(Serialize)]
struct Line<'a, T: Serialize> {
    event: &'a str,
    data: &'a T,
}

impl Writer {
    fn write<T: Serialize>(&self, event: &str, data: &T, text: impl Display) {
        let line = if self.json {
            match serde_json::to_string(&Line { event, data }) {
                Ok(line) => line,
                Err(err) => {
                    warn!(error = %err, event, "failed to serialise output");
                    return;
                }
            }
        } else {
            text.to_string()
        };
        let mut out = self.out.lock();
        if let Err(err) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!(error = %err, "failed to write console output");
        }
    }
}

/// An in-memory writer whose contents stay readable after it is handed to a
/// [`Console`].
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, split into lines.
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
