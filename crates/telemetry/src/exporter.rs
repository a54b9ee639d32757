//! Span exporters: where finished spans end up.

use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Context;
use opentelemetry::trace::SpanKind;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};

use propagation_kernel::settings::OtlpSettings;

const TARGET: &str = "propagation::exporter::logging";

/// Writes one INFO log line per finished span.
#[derive(Debug, Default, Clone)]
pub struct LoggingSpanExporter;

impl LoggingSpanExporter {
    pub fn new() -> Self {
        Self
    }
}

/// `'GET /' : <trace id> <span id> SERVER [tracer: scope] {key=value, ...}`
pub fn format_span(span: &SpanData) -> String {
    let mut line = format!(
        "'{}' : {} {} {} [tracer: {}] {{",
        span.name,
        span.span_context.trace_id(),
        span.span_context.span_id(),
        kind_name(&span.span_kind),
        span.instrumentation_scope.name(),
    );
    for (i, kv) in span.attributes.iter().enumerate() {
        if i > 0 {
            line.push_str(", ");
        }
        let _ = write!(line, "{}={}", kv.key.as_str(), kv.value.as_str());
    }
    line.push('}');
    line
}

fn kind_name(kind: &SpanKind) -> &'static str {
    match kind {
        SpanKind::Client => "CLIENT",
        SpanKind::Server => "SERVER",
        SpanKind::Producer => "PRODUCER",
        SpanKind::Consumer => "CONSUMER",
        SpanKind::Internal => "INTERNAL",
    }
}

impl SpanExporter for LoggingSpanExporter {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        for span in &batch {
            tracing::info!(
                target: TARGET,
                trace_id = %span.span_context.trace_id(),
                span_id = %span.span_context.span_id(),
                events = span.events.events.len(),
                "{}",
                format_span(span)
            );
        }
        Ok(())
    }
}

/// OTLP/HTTP exporter with JSON encoding, posting to the full traces
/// endpoint (`.../v1/traces`).
pub fn otlp_exporter(settings: &OtlpSettings) -> anyhow::Result<opentelemetry_otlp::SpanExporter> {
    opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpJson)
        .with_endpoint(settings.endpoint.as_str())
        .with_timeout(Duration::from_millis(settings.timeout_ms))
        .build()
        .with_context(|| format!("failed to build OTLP exporter for {}", settings.endpoint))
}
