use anyhow::Context;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::books_repository::PostgresBooksRepositoryConfig;

/// Env var pointing at the settings file (extension optional)
pub const CONFIG_FILE_ENV: &str = "CATALOG_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "catalog";
const ENV_PREFIX: &str = "CATALOG";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub publisher: PublisherSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub cors: CorsSettings,
}

impl Settings {
    /// Loads the optional settings file, then `CATALOG__SECTION__KEY` environment overrides
    pub fn load() -> anyhow::Result<Self> {
        let config_file =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(&config_file).required(false))
                .add_source(environment()),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "DatabaseSettings::default_use_in_memory_db")]
    pub use_in_memory_db: bool,
    #[serde(default = "DatabaseSettings::default_hostname")]
    pub hostname: String,
    #[serde(default = "DatabaseSettings::default_credential")]
    pub username: String,
    #[serde(default = "DatabaseSettings::default_credential")]
    pub password: String,
}

impl DatabaseSettings {
    fn default_use_in_memory_db() -> bool {
        true
    }

    fn default_hostname() -> String {
        "127.0.0.1".to_string()
    }

    fn default_credential() -> String {
        "postgres".to_string()
    }

    pub fn postgres_config(&self) -> PostgresBooksRepositoryConfig {
        PostgresBooksRepositoryConfig {
            hostname: self.hostname.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            use_in_memory_db: Self::default_use_in_memory_db(),
            hostname: Self::default_hostname(),
            username: Self::default_credential(),
            password: Self::default_credential(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    #[default]
    Log,
    Queue,
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherSettings {
    #[serde(default)]
    pub kind: PublisherKind,
    #[serde(default = "PublisherSettings::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl PublisherSettings {
    fn default_queue_capacity() -> usize {
        1024
    }
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            kind: PublisherKind::default(),
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "TelemetrySettings::default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub jaeger_enabled: bool,
}

impl TelemetrySettings {
    fn default_service_name() -> String {
        "bookservice_catalog".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: Self::default_service_name(),
            jaeger_enabled: false,
        }
    }
}

/// Cross-origin access for browser clients, any origin is allowed when enabled
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    #[serde(default = "CorsSettings::default_enabled")]
    pub enabled: bool,
    #[serde(default = "CorsSettings::default_max_age_seconds")]
    pub max_age_seconds: usize,
}

impl CorsSettings {
    fn default_enabled() -> bool {
        true
    }

    fn default_max_age_seconds() -> usize {
        3600
    }
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            max_age_seconds: Self::default_max_age_seconds(),
        }
    }
}
