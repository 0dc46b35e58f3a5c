//! `scopeflow` entry point.
//!
//! 1. **Parse configuration**: optional JSON file, then flags and env vars.
//!    An invalid configuration exits before anything runs.
//! 2. **Wire observability**: `tracing-subscriber` to stderr, plus OTLP export
//!    when an endpoint is configured.
//! 3. **Run the sync** and exit with a status matching its [`SyncResult`].

use std::process::ExitCode;

use clap::Parser;
use cli::config::{CliArgs, CliConfig};
use cli::console::Console;
use cli::{observability, sync};
use context::SyncResult;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    let config = CliConfig::load(&args)?;
    let _observability = observability::init(&config)?;

    let report = match sync::run_sync(&config, Console::stdout(config.json_output)).await {
        Ok(report) => report,
        Err(err) => {
            error!(error = ?err, "sync could not run");
            return Err(err);
        }
    };

    if !config.json_output {
        if let Some(timing) = &report.timing {
            println!(
                "Sync {} in {} ms ({} ms building)",
                report.result,
                timing.duration.as_millis(),
                timing
                    .total_for(scopes::EventType::BuildInvocation)
                    .as_millis()
            );
        }
    }

    Ok(match report.result {
        SyncResult::Success => ExitCode::SUCCESS,
        SyncResult::PartialSuccess => ExitCode::from(2),
        SyncResult::Failure => ExitCode::FAILURE,
        SyncResult::Cancelled => ExitCode::from(130),
    })
}
