use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlackConfig {
    pub webhook: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatcherConfig {
    pub db_path: PathBuf,
    pub slack: SlackConfig,
    pub chains: BTreeMap<String, ChainConfig>,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_metrics_addr() -> String {
    DEFAULT_METRICS_ADDR.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl WatcherConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: WatcherConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if let Some((chain_id, _)) = self
            .chains
            .iter()
            .find(|(_, chain)| chain.endpoint.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "chain {chain_id} has an empty endpoint"
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
db_path: /var/lib/upgrade-watcher/upgrades.db
slack:
  webhook: https://hooks.slack.com/services/T000/B000/XXXX
chains:
  cosmoshub-4:
    endpoint: https://rest.cosmos.example
  osmosis-1:
    endpoint: https://rest.osmosis.example/
"#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = WatcherConfig::from_yaml_str(SAMPLE).expect("config");
        assert_eq!(
            config.db_path,
            PathBuf::from("/var/lib/upgrade-watcher/upgrades.db")
        );
        assert_eq!(config.chains.len(), 2);
        assert_eq!(
            config.chains["osmosis-1"].endpoint,
            "https://rest.osmosis.example/"
        );
        assert_eq!(config.metrics_addr, DEFAULT_METRICS_ADDR);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn missing_required_key_is_parse_error() {
        let err = WatcherConfig::from_yaml_str("db_path: x.db\nchains: {}\n")
            .expect_err("slack is required");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_interval_and_blank_endpoint() {
        let zero = format!("{SAMPLE}poll_interval_secs: 0\n");
        assert!(matches!(
            WatcherConfig::from_yaml_str(&zero),
            Err(ConfigError::Invalid(_))
        ));

        let blank = r#"
db_path: x.db
slack: { webhook: "http://localhost/hook" }
chains:
  chain-x: { endpoint: "  " }
"#;
        assert!(matches!(
            WatcherConfig::from_yaml_str(blank),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write");
        let config = WatcherConfig::from_path(file.path()).expect("config");
        assert!(config.chains.contains_key("cosmoshub-4"));

        let missing = WatcherConfig::from_path("/nonexistent/upgrade-watcher.yaml");
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
