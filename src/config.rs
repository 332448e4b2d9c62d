use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

const DEFAULT_PATH: &str = "config.toml";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http_port: u16,
    pub query_timeout_ms: u64,
    // bound for queries reading a whole table
    pub scan_timeout_ms: u64,

    // include database error messages in 500 responses
    pub expose_error_details: bool,

    pub connect_retries: u32,
    pub connect_retry_delay_ms: u64,

    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            query_timeout_ms: 3000,
            scan_timeout_ms: 30_000,
            expose_error_details: false,
            connect_retries: 5,
            connect_retry_delay_ms: 2000,
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 3306,
            user: "root".to_owned(),
            password: String::new(),
            name: "towerdb".to_owned(),
            max_connections: 10,
        }
    }
}

impl Config {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    /// Applies the environment variables the deployment scripts set.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = parse_var(&var, "PORT")? {
            self.http_port = port;
        }
        if let Some(host) = var("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = parse_var(&var, "DB_PORT")? {
            self.database.port = port;
        }
        if let Some(user) = var("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = var("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(name) = var("DB_NAME") {
            self.database.name = name;
        }
        Ok(())
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|x| x.trim().parse())
        .transpose()
        .with_context(|| format!("Invalid value for {key}"))
}

fn parse(data: &str) -> Result<Config> {
    toml::from_str(data).context("Failed to parse config")
}

/// Loads the config file, then applies environment overrides (including a
/// `.env` file if there is one).
///
/// Without an explicit path a missing `config.toml` is not an error.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => parse(&fs::read_to_string(path).context("Failed to read config")?)?,
        None if Path::new(DEFAULT_PATH).exists() => {
            parse(&fs::read_to_string(DEFAULT_PATH).context("Failed to read config")?)?
        }
        None => {
            info!("no {DEFAULT_PATH} found, using defaults");
            Config::default()
        }
    };

    dotenvy::dotenv().ok();
    config.apply_env(|key| dotenvy::var(key).ok())?;

    Ok(config)
}
