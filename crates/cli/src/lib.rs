//! Composition root for the `scopeflow` binary.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | [`CliConfig`](config::CliConfig): JSON file + flag/env overrides, validation |
//! | [`observability`] | `tracing-subscriber` and optional OpenTelemetry export |
//! | [`console`] | Scope rendering pipeline output to stdout |
//! | [`sync`] | The simulated multi-phase sync driven through [`context::Context`] |

pub mod config;
pub mod console;
pub mod observability;
pub mod sync;
