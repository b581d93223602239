//! Process configuration, read once at startup from a single JSON file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::time_service::config::{TimeServiceConfig, TimeSourceConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_log_path")]
    pub log_path: String,
    #[serde(default)]
    pub time_service: TimeServiceConfig,
    #[serde(default)]
    pub ntp_server: Vec<TimeSourceConfig>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "trustclock_auction.db".to_string()
}

fn default_log_path() -> String {
    "trustclock_auction.log".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            log_path: default_log_path(),
            time_service: TimeServiceConfig::default(),
            ntp_server: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, resolving relative paths against
    /// the crate's manifest directory rather than the caller's working
    /// directory, so `cargo run` from any directory sees the same config.
    pub fn load(path: &Path) -> Result<Self> {
        let resolved = resolve_path(path);
        let raw = std::fs::read_to_string(&resolved)
            .with_context(|| format!("reading config file {}", resolved.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", resolved.display()))?;
        Ok(config)
    }

    /// The default config path, anchored to the manifest directory.
    pub fn default_path() -> PathBuf {
        resolve_path(Path::new("config.json"))
    }

    /// `db_path`, resolved the same way as the config file itself.
    pub fn resolved_db_path(&self) -> PathBuf {
        resolve_path(Path::new(&self.db_path))
    }
}

fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    base.join(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_parses_minimal_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"host\": \"127.0.0.1\", \"port\": 9090}}").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9090);
        assert_eq!(config.db_path, default_db_path());
    }

    #[test]
    fn missing_file_errors() {
        let result = Config::load(Path::new("/nonexistent/config.json"));
        assert!(result.is_err());
    }
}
