//! Telemetry bootstrap: logging, the tracer provider, and span export.

use std::time::Duration;

use opentelemetry_sdk::trace::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracerProvider,
};
use opentelemetry_sdk::Resource;
use propagation_kernel::settings::{BatchSettings, ExporterKind, TelemetrySettings};

pub mod exporter;
pub mod logging;
pub mod module;
pub mod span;

pub use exporter::{format_span, otlp_exporter, LoggingSpanExporter};
pub use logging::init_logging;
pub use module::TelemetryModule;
pub use span::start_server_span;

/// Build the tracer provider described by `settings`: `logging` exports each
/// span as it ends, `otlp` exports in batches from a background thread.
pub fn init_tracer_provider(settings: &TelemetrySettings) -> anyhow::Result<SdkTracerProvider> {
    let mut builder = SdkTracerProvider::builder()
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_resource(service_resource(&settings.service_name));

    for exporter in &settings.exporters {
        builder = match exporter {
            ExporterKind::Logging => builder.with_simple_exporter(LoggingSpanExporter::new()),
            ExporterKind::Otlp => {
                let otlp = otlp_exporter(&settings.otlp)?;
                tracing::info!(endpoint = %settings.otlp.endpoint, "exporting spans over OTLP/HTTP");
                builder.with_span_processor(
                    BatchSpanProcessor::builder(otlp)
                        .with_batch_config(batch_config(&settings.batch))
                        .build(),
                )
            }
            ExporterKind::None => builder,
        };
    }

    Ok(builder.build())
}

/// SDK default resource with `service.name` set.
pub fn service_resource(service_name: &str) -> Resource {
    Resource::builder()
        .with_service_name(service_name.to_string())
        .build()
}

fn batch_config(settings: &BatchSettings) -> BatchConfig {
    let max_queue_size = settings.max_queue_size.max(1);
    BatchConfigBuilder::default()
        .with_max_queue_size(max_queue_size)
        .with_max_export_batch_size(settings.max_export_batch_size.clamp(1, max_queue_size))
        .with_scheduled_delay(Duration::from_millis(settings.scheduled_delay_ms))
        .build()
}
