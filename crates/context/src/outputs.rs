//! Built-in output event types.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`PrintOutput`] | A line of console text |
//! | [`StatusOutput`] | Progress status, usually shown next to a progress bar |
//! | [`IssueOutput`] | A diagnostic that also sets the error/warning flag when submitted |
//! | [`SummaryOutput`] | A top-level summary line |
//! | [`PerformanceWarning`] | A hint that something ran slower than it should |
//!
//! All of them serialise to JSON so sinks can forward them verbatim.

use serde::Serialize;

use crate::{Context, Output, Timestamp};

// ---------------------------------------------------------------------------
// Console text
// ---------------------------------------------------------------------------

/// How a [`PrintOutput`] line should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Ordinary console text.
    Normal,
    /// Text that should only appear in logs.
    Log,
    /// Error text.
    Error,
    /// Raw output from an external process.
    Process,
}

/// A line of console text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintOutput {
    /// The text to print.
    pub text: String,
    /// Presentation hint.
    pub kind: OutputKind,
}

impl PrintOutput {
    /// Ordinary console text.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_kind(text, OutputKind::Normal)
    }

    /// Text destined for logs only.
    pub fn log(text: impl Into<String>) -> Self {
        Self::with_kind(text, OutputKind::Log)
    }

    /// Error text.
    pub fn error(text: impl Into<String>) -> Self {
        Self::with_kind(text, OutputKind::Error)
    }

    /// Output relayed from an external process.
    pub fn process(text: impl Into<String>) -> Self {
        Self::with_kind(text, OutputKind::Process)
    }

    fn with_kind(text: impl Into<String>, kind: OutputKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

impl Output for PrintOutput {}

impl std::fmt::Display for PrintOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Progress status text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusOutput {
    /// The status line.
    pub status: String,
}

impl StatusOutput {
    /// Creates a status update.
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

impl Output for StatusOutput {}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Severity of an [`IssueOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// Fails the operation once submitted.
    Error,
    /// Marks the operation as having warnings once submitted.
    Warning,
    /// Informational note.
    Note,
    /// Informational message.
    Info,
}

/// A diagnostic, optionally tied to a file location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueOutput {
    /// Severity.
    pub category: IssueCategory,
    /// Human-readable message.
    pub message: String,
    /// File the issue relates to, if any.
    pub file: Option<String>,
    /// 1-based line, if known.
    pub line: Option<u32>,
    /// 1-based column, if known.
    pub column: Option<u32>,
}

impl IssueOutput {
    /// An error issue.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(IssueCategory::Error, message)
    }

    /// A warning issue.
    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(IssueCategory::Warning, message)
    }

    /// An informational issue.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(IssueCategory::Info, message)
    }

    /// A note.
    pub fn note(message: impl Into<String>) -> Self {
        Self::new(IssueCategory::Note, message)
    }

    fn new(category: IssueCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    /// Attaches a file path.
    #[must_use]
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attaches a line and column.
    #[must_use]
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Outputs the issue on `context` and raises the matching flag: errors set
    /// the error flag, warnings the warning flag.
    pub fn submit(self, context: &Context) {
        let category = self.category;
        context.output(self);
        match category {
            IssueCategory::Error => context.set_has_error(),
            IssueCategory::Warning => context.set_has_warnings(),
            IssueCategory::Note | IssueCategory::Info => {}
        }
    }
}

impl Output for IssueOutput {}

impl std::fmt::Display for IssueOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(column)) => {
                write!(f, "{file}:{line}:{column}: {}", self.message)
            }
            (Some(file), _, _) => write!(f, "{file}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Prefix printed before a [`SummaryOutput`] line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "at")]
pub enum SummaryPrefix {
    /// Prefix with the time of day the summary was produced.
    Timestamp(Timestamp),
    /// No prefix.
    None,
}

/// A top-level summary line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryOutput {
    /// Prefix shown before the text.
    pub prefix: SummaryPrefix,
    /// Summary text.
    pub text: String,
    /// Collapse identical lines into one.
    pub dedupe: bool,
    /// Whether the line reports a failure.
    pub is_error: bool,
}

impl SummaryOutput {
    /// A summary line prefixed with the current time.
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            prefix: SummaryPrefix::Timestamp(Timestamp::now()),
            text: text.into(),
            dedupe: false,
            is_error: false,
        }
    }

    /// A failure summary prefixed with the current time.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::output(text)
        }
    }

    /// Removes the prefix.
    #[must_use]
    pub fn without_prefix(mut self) -> Self {
        self.prefix = SummaryPrefix::None;
        self
    }

    /// Marks the line as collapsible with identical lines.
    #[must_use]
    pub fn dedupe(mut self) -> Self {
        self.dedupe = true;
        self
    }
}

impl Output for SummaryOutput {}

impl std::fmt::Display for SummaryOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.prefix {
            SummaryPrefix::Timestamp(at) => write!(f, "{} {}", at.time_of_day(), self.text),
            SummaryPrefix::None => f.write_str(&self.text),
        }
    }
}

/// Reports that part of an operation was unexpectedly slow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceWarning {
    /// Description of what was slow.
    pub text: String,
}

impl PerformanceWarning {
    /// Creates a warning.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Output for PerformanceWarning {}
