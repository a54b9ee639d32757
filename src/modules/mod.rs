pub mod hello;

use std::sync::Arc;

use opentelemetry::propagation::TextMapPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use propagation_kernel::{settings::Settings, ModuleRegistry};

/// Register all project-specific modules with the registry
pub fn register_all(
    registry: &mut ModuleRegistry,
    settings: &Settings,
    provider: &SdkTracerProvider,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
) {
    registry.register_custom(Arc::new(hello::HelloModule::new(
        provider, propagator, settings,
    )));
}
