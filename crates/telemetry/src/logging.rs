use anyhow::Context;
use tracing_subscriber::EnvFilter;

use propagation_kernel::settings::{LogFormat, TelemetrySettings};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. If a subscriber is
/// already installed (tests, embedding) the existing one is kept.
pub fn init_logging(settings: &TelemetrySettings) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.log_level)
            .with_context(|| format!("invalid log level '{}'", settings.log_level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match settings.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };

    if installed.is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }

    Ok(())
}
