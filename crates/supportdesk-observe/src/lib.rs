//! Observability setup for supportdesk: tracing subscriber and optional
//! OpenTelemetry export.

pub mod tracing_setup;
