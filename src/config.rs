//! TOML configuration shared by the server and locate binaries.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
use crate::range::{DEFAULT_CANDIDATE_FACTOR, DEFAULT_LIMIT};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub boundaries: BoundaryConfig,
    pub tracks: Option<TrackConfig>,
    pub range: RangeConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Boundary CSV, optionally gzipped
    pub path: PathBuf,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/boundaries.csv"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackConfig {
    /// Track records CSV, optionally gzipped
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RangeConfig {
    pub candidate_factor: usize,
    pub default_limit: usize,
    /// Upper bound on a client-requested limit
    pub max_limit: usize,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            candidate_factor: DEFAULT_CANDIDATE_FACTOR,
            default_limit: DEFAULT_LIMIT,
            max_limit: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub query_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
            query_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.range.candidate_factor == 0 {
            return Err(Error::Config("range.candidate_factor must be at least 1".to_string()));
        }
        if self.range.default_limit > self.range.max_limit {
            return Err(Error::Config(format!(
                "range.default_limit ({}) exceeds range.max_limit ({})",
                self.range.default_limit, self.range.max_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.boundaries.path, PathBuf::from("data/boundaries.csv"));
        assert!(config.tracks.is_none());
        assert_eq!(config.range.candidate_factor, 2);
        assert_eq!(config.range.default_limit, 1000);
        assert_eq!(config.server.listen, "0.0.0.0:3000");
        assert_eq!(config.server.query_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [boundaries]
            path = "/srv/quyu/boundaries.csv.gz"

            [tracks]
            path = "/srv/quyu/tracks.csv"

            [range]
            candidate_factor = 5
            default_limit = 200

            [server]
            listen = "127.0.0.1:8080"
            query_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.boundaries.path, PathBuf::from("/srv/quyu/boundaries.csv.gz"));
        assert_eq!(
            config.tracks.map(|t| t.path),
            Some(PathBuf::from("/srv/quyu/tracks.csv"))
        );
        assert_eq!(config.range.candidate_factor, 5);
        assert_eq!(config.range.max_limit, 10_000);
        assert_eq!(config.server.query_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_toml("[range]\ncandidate_factor = 0").is_err());
        assert!(Config::from_toml("[range]\ndefault_limit = 50\nmax_limit = 10").is_err());
        assert!(Config::from_toml("[server]\nlisten = 3").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quyu.toml");
        fs::write(&path, "[boundaries]\npath = \"b.csv\"\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.boundaries.path, PathBuf::from("b.csv"));
        assert!(Config::load_from_file(dir.path().join("missing.toml")).is_err());
    }
}
