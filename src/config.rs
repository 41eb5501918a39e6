use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "tmpo.ron";
pub const ENV_PREFIX: &str = "TMPO";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config error `{0}`")]
    Load(#[from] config::ConfigError),
    #[error("`workers` must be at least 1")]
    NoWorkers,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TmpoConfig {
    /// sqlite cache location
    pub db: PathBuf,
    pub host: String,
    pub scheme: String,
    /// extra root certificate (PEM) trusted for `host`
    pub cert: Option<PathBuf>,
    /// max fetches in flight per sync
    pub workers: usize,
    pub timeout_secs: u64,
    /// seconds after a block's coverage end during which the remote is not polled
    pub poll_guard: i64,
    /// tracing filter used when RUST_LOG is unset
    pub log: String,
}

impl Default for TmpoConfig {
    fn default() -> Self {
        Self {
            db: default_db_path(),
            host: "api.flukso.net".to_string(),
            scheme: "https".to_string(),
            cert: None,
            workers: 16,
            timeout_secs: 30,
            poll_guard: 256,
            log: "info".to_string(),
        }
    }
}

fn default_db_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let dir = if cfg!(windows) { "tmpo" } else { ".tmpo" };
    home.join(dir).join("tmpo.sqlite3")
}

impl TmpoConfig {
    /// Loads `file_path` (optional unless `required`), then `TMPO_*` env vars.
    pub fn load(file_path: &str, required: bool) -> Result<Self, ConfigError> {
        let cfg: Self = Config::builder()
            .add_source(File::with_name(file_path).required(required))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        cfg.validate()
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = Config::builder()
            .add_source(File::from_str(s, config::FileFormat::Ron))
            .build()?
            .try_deserialize()?;
        cfg.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(self)
    }
}
