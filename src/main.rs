use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use propagation_kernel::{settings::Settings, ModuleRegistry};
use propagation_telemetry::TelemetryModule;

/// HTTP server that continues B3 and W3C traces from incoming requests.
#[derive(Parser, Debug)]
#[command(name = "propagation-server", version, about)]
struct Cli {
    /// Address to bind, overriding `server.host`
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding `server.port`
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding `base.toml` and the per-environment overlays
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config_dir {
        Some(dir) => Settings::load_from(dir),
        None => Settings::load(),
    }
    .context("failed to load settings")?;

    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    propagation_telemetry::init_logging(&settings.telemetry)?;

    tracing::info!(
        env = ?settings.environment,
        service = %settings.telemetry.service_name,
        "propagation-server bootstrap starting"
    );

    let provider = propagation_telemetry::init_tracer_provider(&settings.telemetry)?;
    let propagator = propagation_context::from_names(&settings.telemetry.propagators)
        .context("invalid telemetry.propagators")?;

    let mut registry = ModuleRegistry::new();
    registry.register_core(Arc::new(TelemetryModule::new(provider.clone())));
    propagation_app::register_all(&mut registry, &settings, &provider, Arc::new(propagator));

    propagation_app::run(
        &registry,
        &settings,
        propagation_http::start_server(&registry, &settings),
    )
    .await
}
