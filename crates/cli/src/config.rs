//! CLI configuration.
//!
//! Values come from an optional JSON file, then command-line flags and
//! environment variables override them. The merged result is validated before
//! anything runs.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`CliConfig`].
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// There is nothing to sync.
    #[error("no targets configured")]
    NoTargets,

    /// At least one worker is required.
    #[error("workers must be at least 1")]
    NoWorkers,

    /// A simulated failure or warning names a target that is not synced.
    #[error("'{target}' is not one of the configured targets")]
    UnknownTarget { target: String },

    /// The tracing filter directive does not parse.
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidLogFilter { filter: String, reason: String },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Format of the diagnostic log written to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Fully merged and validated configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Name shown in progress and summary output.
    pub project: String,
    /// Targets the simulated sync builds.
    pub targets: Vec<String>,
    /// Targets whose build fails with a compile error.
    pub fail_targets: Vec<String>,
    /// Targets whose build succeeds with a warning.
    pub warn_targets: Vec<String>,
    /// Simulated build time per target, in milliseconds.
    pub build_millis: u64,
    /// Builds slower than this produce a performance warning.
    pub slow_build_millis: u64,
    /// Maximum number of targets built concurrently.
    pub workers: usize,
    /// Cancel the sync once this many seconds have passed.
    pub deadline_secs: Option<u64>,
    /// Keep going after a failed target.
    pub keep_going: bool,
    /// Print pipeline output as JSON lines instead of text.
    pub json_output: bool,
    /// Format of the diagnostic log on stderr.
    pub log_format: LogFormat,
    /// `tracing` filter directive.
    pub log_filter: String,
    /// OTLP collector endpoint. Tracing is only exported when set.
    pub otlp_endpoint: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            project: "workspace".to_string(),
            targets: vec!["//app:main".to_string()],
            fail_targets: Vec::new(),
            warn_targets: Vec::new(),
            build_millis: 50,
            slow_build_millis: 1_000,
            workers: 4,
            deadline_secs: None,
            keep_going: true,
            json_output: false,
            log_format: LogFormat::Pretty,
            log_filter: "info".to_string(),
            otlp_endpoint: None,
        }
    }
}

impl CliConfig {
    /// Reads a configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the configuration for a run: the file named by `args` (if any),
    /// overridden by the flags set in `args`, then validated.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`]; the run must not start.
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, args: &CliArgs) {
        if let Some(project) = &args.project {
            self.project = project.clone();
        }
        if !args.targets.is_empty() {
            self.targets = args.targets.clone();
        }
        if !args.fail_targets.is_empty() {
            self.fail_targets = args.fail_targets.clone();
        }
        if !args.warn_targets.is_empty() {
            self.warn_targets = args.warn_targets.clone();
        }
        if let Some(millis) = args.build_millis {
            self.build_millis = millis;
        }
        if let Some(workers) = args.workers {
            self.workers = workers;
        }
        if args.deadline_secs.is_some() {
            self.deadline_secs = args.deadline_secs;
        }
        if args.fail_fast {
            self.keep_going = false;
        }
        if args.json_output {
            self.json_output = true;
        }
        if let Some(format) = args.log_format {
            self.log_format = format;
        }
        if let Some(filter) = &args.log_filter {
            self.log_filter = filter.clone();
        }
        if args.otlp_endpoint.is_some() {
            self.otlp_endpoint = args.otlp_endpoint.clone();
        }
    }

    /// Checks the merged configuration.
    ///
    /// # Errors
    ///
    /// The first problem found, as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if let Some(target) = self
            .fail_targets
            .iter()
            .chain(&self.warn_targets)
            .find(|target| !self.targets.contains(target))
        {
            return Err(ConfigError::UnknownTarget {
                target: target.clone(),
            });
        }
        tracing_subscriber::EnvFilter::try_new(&self.log_filter).map_err(|err| {
            ConfigError::InvalidLogFilter {
                filter: self.log_filter.clone(),
                reason: err.to_string(),
            }
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Runs a simulated multi-phase project sync.
#[derive(Debug, Default, Parser)]
#[command(name = "scopeflow", version, about)]
pub struct CliArgs {
    /// JSON configuration file.
    #[arg(long, env = "SCOPEFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project name shown in output.
    #[arg(long)]
    pub project: Option<String>,

    /// Target to sync. Repeat for several.
    #[arg(long = "target")]
    pub targets: Vec<String>,

    /// Target whose build should fail.
    #[arg(long = "fail")]
    pub fail_targets: Vec<String>,

    /// Target whose build should warn.
    #[arg(long = "warn")]
    pub warn_targets: Vec<String>,

    /// Simulated build time per target, in milliseconds.
    #[arg(long)]
    pub build_millis: Option<u64>,

    /// Maximum number of targets built concurrently.
    #[arg(long, env = "SCOPEFLOW_WORKERS")]
    pub workers: Option<usize>,

    /// Cancel the sync after this many seconds.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Stop building after the first failed target.
    #[arg(long)]
    pub fail_fast: bool,

    /// Print pipeline output as JSON lines.
    #[arg(long = "json")]
    pub json_output: bool,

    /// Format of the diagnostic log on stderr.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// `tracing` filter directive.
    #[arg(long, env = "SCOPEFLOW_LOG")]
    pub log_filter: Option<String>,

    /// OTLP collector endpoint for exported spans.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}
