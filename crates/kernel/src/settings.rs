use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "PROPAGATION_ENV";
const CONFIG_DIR_ENV: &str = "PROPAGATION_CONFIG_DIR";
const ENV_PREFIX: &str = "PROPAGATION";

/// Unprefixed variables common in existing deployments.
const LEGACY_PORT_VAR: &str = "SERVER_PORT";
const LEGACY_OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT";
const LEGACY_SERVICE_NAME_VAR: &str = "OTEL_SERVICE_NAME";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(anyhow!(
                "unsupported environment '{}'; expected local/staging/production",
                other
            )),
        }
    }
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, environment overlay,
    /// and environment variables. The directory comes from
    /// `PROPAGATION_CONFIG_DIR`, defaulting to `config`.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(None)
    }

    /// Same as [`Settings::load`] with an explicit configuration directory.
    pub fn load_from(config_dir: &Path) -> anyhow::Result<Self> {
        Self::load_with(Some(config_dir))
    }

    fn load_with(config_dir: Option<&Path>) -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        match config_dir {
            Some(dir) => Self::from_layers(dir),
            None => {
                let dir = std::env::var(CONFIG_DIR_ENV)
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("config"));
                Self::from_layers(&dir)
            }
        }
    }

    /// Files and process environment only; `.env` is already applied.
    fn from_layers(config_dir: &Path) -> anyhow::Result<Self> {
        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let environment: Environment = environment.parse()?;

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment_name(&environment)));

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("telemetry.exporters")
                    .with_list_parse_key("telemetry.propagators")
                    .try_parsing(true),
            )
            .set_override_option(
                "server.port",
                std::env::var(LEGACY_PORT_VAR).ok(),
            )
            .with_context(|| format!("invalid {}", LEGACY_PORT_VAR))?
            .set_override_option(
                "telemetry.otlp.endpoint",
                std::env::var(LEGACY_OTLP_ENDPOINT_VAR).ok(),
            )
            .with_context(|| format!("invalid {}", LEGACY_OTLP_ENDPOINT_VAR))?
            .set_override_option(
                "telemetry.service_name",
                std::env::var(LEGACY_SERVICE_NAME_VAR).ok(),
            )
            .with_context(|| format!("invalid {}", LEGACY_SERVICE_NAME_VAR))?;

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // The selector variable wins over whatever the files say.
        settings.environment = environment;

        Ok(settings)
    }
}

fn environment_name(environment: &Environment) -> &'static str {
    match environment {
        Environment::Local => "local",
        Environment::Staging => "staging",
        Environment::Production => "production",
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "TelemetrySettings::default_service_name")]
    pub service_name: String,
    #[serde(default = "TelemetrySettings::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "TelemetrySettings::default_exporters")]
    pub exporters: Vec<ExporterKind>,
    #[serde(default = "TelemetrySettings::default_propagators")]
    pub propagators: Vec<String>,
    /// Reuse the client's span id for B3 server spans (Zipkin shared spans).
    #[serde(default)]
    pub join_server_spans: bool,
    #[serde(default)]
    pub otlp: OtlpSettings,
    #[serde(default)]
    pub batch: BatchSettings,
}

impl TelemetrySettings {
    fn default_service_name() -> String {
        "propagation-http-server".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_exporters() -> Vec<ExporterKind> {
        vec![ExporterKind::Logging]
    }

    fn default_propagators() -> Vec<String> {
        vec!["tracecontext".to_string(), "b3multi".to_string()]
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: Self::default_service_name(),
            log_level: Self::default_log_level(),
            log_format: LogFormat::Pretty,
            exporters: Self::default_exporters(),
            propagators: Self::default_propagators(),
            join_server_spans: false,
            otlp: OtlpSettings::default(),
            batch: BatchSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Span exporters that can be switched on from configuration.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    Logging,
    Otlp,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtlpSettings {
    #[serde(default = "OtlpSettings::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "OtlpSettings::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl OtlpSettings {
    fn default_endpoint() -> String {
        "http://localhost:4318/v1/traces".to_string()
    }

    fn default_timeout_ms() -> u64 {
        30000
    }
}

impl Default for OtlpSettings {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "BatchSettings::default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "BatchSettings::default_max_export_batch_size")]
    pub max_export_batch_size: usize,
    #[serde(default = "BatchSettings::default_scheduled_delay_ms")]
    pub scheduled_delay_ms: u64,
}

impl BatchSettings {
    fn default_max_queue_size() -> usize {
        2048
    }

    fn default_max_export_batch_size() -> usize {
        512
    }

    fn default_scheduled_delay_ms() -> u64 {
        5000
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_queue_size: Self::default_max_queue_size(),
            max_export_batch_size: Self::default_max_export_batch_size(),
            scheduled_delay_ms: Self::default_scheduled_delay_ms(),
        }
    }
}
