//! `tracing` subscriber wiring.
//!
//! Diagnostics go to stderr through a pretty or JSON fmt layer filtered by
//! the configured directive. When an OTLP endpoint is configured, spans are
//! also exported through OpenTelemetry.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{CliConfig, LogFormat};

const SERVICE_NAME: &str = "scopeflow";

/// Flushes exported spans when dropped.
#[derive(Debug)]
pub struct ObservabilityGuard {
    provider: Option<TracerProvider>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(err) = provider.shutdown() {
                eprintln!("failed to flush OpenTelemetry spans: {err}");
            }
        }
    }
}

/// Installs the global subscriber. Must be called from inside a tokio
/// runtime when an OTLP endpoint is configured.
///
/// # Errors
///
/// Fails if the filter does not parse, the exporter cannot be built, or a
/// global subscriber is already installed.
pub fn init(config: &CliConfig) -> anyhow::Result<ObservabilityGuard> {
    let filter = EnvFilter::try_new(&config.log_filter)?;

    let provider = match &config.otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()?;
            Some(
                TracerProvider::builder()
                    .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                    .build(),
            )
        }
        None => None,
    };
    let otel_layer = provider
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME)));

    let (pretty, json) = match config.log_format {
        LogFormat::Pretty => (Some(fmt::layer().with_writer(std::io::stderr)), None),
        LogFormat::Json => (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(pretty)
        .with(json)
        .try_init()?;

    Ok(ObservabilityGuard { provider })
}
