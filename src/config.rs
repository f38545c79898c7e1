use crate::error::{OrgError, OrgResult};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Which edge and membership backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Surreal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// `memory` for the embedded engine, otherwise a SurrealDB URL.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            endpoint: "memory".to_string(),
            namespace: "orgchart".to_string(),
            database: "orgchart".to_string(),
            username: "root".to_string(),
            password: "root".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "orgchart=info,tower_http=info".to_string(),
            json: false,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> OrgResult<AppConfig> {
    let mut builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::with_prefix("ORGCHART").separator("__"));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .build()
        .map_err(|err| OrgError::ConfigError(err.to_string()))?;

    let parsed: AppConfig = config
        .try_deserialize()
        .map_err(|err| OrgError::ConfigError(err.to_string()))?;

    if parsed.storage.backend == StorageBackend::Memory && parsed.storage.endpoint != "memory" {
        return Err(OrgError::ConfigError(format!(
            "storage.endpoint '{}' requires storage.backend = 'surreal'",
            parsed.storage.endpoint
        )));
    }

    Ok(parsed)
}
