use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable pointing at an optional YAML config file.
pub const CONFIG_PATH_VAR: &str = "XRAY_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub audit_timeout_secs: u64,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub connect_timeout_secs: u64,
    pub max_connections: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            model_path: PathBuf::from("/app/worker/models/weight.pt"),
            audit_timeout_secs: 5,
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "xray".to_string(),
            host: "postgres".to_string(),
            port: 5432,
            user: "xray_user".to_string(),
            password: "12345".to_string(),
            connect_timeout_secs: 3,
            max_connections: 5,
        }
    }
}

impl ServiceConfig {
    /// Reads `$XRAY_CONFIG` when set, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("MODEL_PATH") {
            self.model_path = PathBuf::from(path);
        }
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        override_parsed(&lookup, "PORT", &mut self.port)?;
        override_parsed(&lookup, "AUDIT_TIMEOUT_SECS", &mut self.audit_timeout_secs)?;

        let db = &mut self.database;
        if let Some(name) = lookup("DB") {
            db.name = name;
        }
        if let Some(host) = lookup("DB_HOST") {
            db.host = host;
        }
        override_parsed(&lookup, "DB_PORT", &mut db.port)?;
        if let Some(user) = lookup("DB_USER") {
            db.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            db.password = password;
        }
        override_parsed(&lookup, "DB_CONNECT_TIMEOUT_SECS", &mut db.connect_timeout_secs)?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_secs(self.audit_timeout_secs)
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn override_parsed<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value })?;
    }
    Ok(())
}
