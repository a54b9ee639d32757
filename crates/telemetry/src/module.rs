use anyhow::Context;
use async_trait::async_trait;
use opentelemetry_sdk::trace::SdkTracerProvider;
use propagation_kernel::{InitCtx, Module};

/// Core module owning the span pipeline; stopping it flushes pending spans.
pub struct TelemetryModule {
    provider: SdkTracerProvider,
}

impl TelemetryModule {
    pub fn new(provider: SdkTracerProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Module for TelemetryModule {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            service = %ctx.settings.telemetry.service_name,
            exporters = ?ctx.settings.telemetry.exporters,
            propagators = ?ctx.settings.telemetry.propagators,
            "telemetry module initialized"
        );
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        // Shutdown blocks until the batch exporter thread has drained.
        let provider = self.provider.clone();
        tokio::task::spawn_blocking(move || provider.shutdown())
            .await
            .context("tracer provider shutdown task failed")?
            .context("failed to shut down tracer provider")?;
        tracing::info!(module = self.name(), "telemetry module stopped");
        Ok(())
    }
}
