use crate::middleware::DEFAULT_EXEMPT_PATHS;
use serde;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub app_port: u16,
    pub app_host: String,
    /// Reported by `/health`; the crate version when unset.
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HealthSettings {
    pub probe_timeout_secs: u64,
    pub readiness_timeout_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 5,
            readiness_timeout_secs: 3,
        }
    }
}

impl HealthSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MetricsSettings {
    /// Paths the request metrics middleware does not record.
    pub exempt_paths: Vec<String>,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            exempt_paths: DEFAULT_EXEMPT_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Settings {
    pub fn version(&self) -> String {
        self.app_version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    }
}

impl DatabaseSettings {
    // Connection string: postgresql://<username>:<password>@<host>:<port>/<database_name>
    pub fn connection_string(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name,
        )
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    config::Config::builder()
        // .json, .toml, .yaml, .yml
        .add_source(config::File::with_name("configuration").required(false))
        // APP_APP_PORT=8000, APP_DATABASE__HOST=db, ...
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()
}
