use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "student.toml";
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_DATABASE_URL: &str = "sqlite://./data/student.db";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub database_url: String,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            database_url: DEFAULT_DATABASE_URL.into(),
            request_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Command-line flags win over every other source.
    pub fn with_overrides(mut self, server_url: Option<String>, database_url: Option<String>) -> Self {
        if let Some(server_url) = server_url {
            self.server_url = server_url;
        }
        if let Some(database_url) = database_url {
            self.database_url = database_url;
        }
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Defaults, then `student.toml` (or the explicit `config_path`), then
/// `APP__*` environment variables.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    settings_from_sources(config_path, app_environment())
}

fn app_environment() -> Environment {
    Environment::with_prefix("APP")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn settings_from_sources(config_path: Option<&Path>, environment: Environment) -> Result<Settings> {
    let defaults = Settings::default();
    let file = match config_path {
        Some(path) => File::from(path).required(true),
        None => File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false),
    };

    let settings = Config::builder()
        .set_default("server_url", defaults.server_url)?
        .set_default("database_url", defaults.database_url)?
        .add_source(file)
        .add_source(environment)
        .build()
        .context("failed to read configuration")?
        .try_deserialize::<Settings>()
        .context("invalid configuration")?;

    Ok(settings)
}

/// Turns a bare file path into a `sqlite://` url. The parent directory is
/// created when the store opens.
pub fn prepare_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return DEFAULT_DATABASE_URL.to_string();
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
