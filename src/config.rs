use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base-protocol handshake version advertised in Hello. Peers at this version or
/// above switch the stream to compressed mode.
pub const BASE_PROTOCOL_VERSION: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Deadlines of the request/serve loop, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeTimeouts {
    /// overall budget measured from loop entry
    pub budget_ms: u64,
    pub legacy_read_ms: u64,
    pub correlated_read_ms: u64,
}

impl Default for ServeTimeouts {
    fn default() -> Self {
        Self { budget_ms: 20_000, legacy_read_ms: 5_000, correlated_read_ms: 10_000 }
    }
}

impl ServeTimeouts {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn legacy_read(&self) -> Duration {
        Duration::from_millis(self.legacy_read_ms)
    }

    pub fn correlated_read(&self) -> Duration {
        Duration::from_millis(self.correlated_read_ms)
    }
}

/// Client settings, loadable from TOML. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub client_name: String,
    pub listen_port: u64,
    pub base_protocol_version: u64,
    pub handshake_timeout_ms: u64,
    pub status_timeout_ms: u64,
    pub serve: ServeTimeouts,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: concat!("eth-conformance/v", env!("CARGO_PKG_VERSION")).to_string(),
            listen_port: 0,
            base_protocol_version: BASE_PROTOCOL_VERSION,
            handshake_timeout_ms: 10_000,
            status_timeout_ms: 20_000,
            serve: ServeTimeouts::default(),
        }
    }
}

impl ClientConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.status_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.serve.budget(), Duration::from_secs(20));
        assert_eq!(cfg.serve.legacy_read(), Duration::from_secs(5));
        assert_eq!(cfg.serve.correlated_read(), Duration::from_secs(10));
        assert_eq!(cfg.base_protocol_version, 5);
        assert!(cfg.client_name.starts_with("eth-conformance/v"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = ClientConfig::from_toml_str(
            r#"
            client_name = "probe"
            status_timeout_ms = 1500

            [serve]
            budget_ms = 3000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.client_name, "probe");
        assert_eq!(cfg.status_timeout_ms, 1500);
        assert_eq!(cfg.handshake_timeout_ms, 10_000);
        assert_eq!(cfg.serve.budget_ms, 3000);
        assert_eq!(cfg.serve.legacy_read_ms, 5000);
    }

    #[test]
    fn load_errors() {
        assert!(matches!(
            ClientConfig::load("/definitely/not/here.toml"),
            Err(ConfigError::Io { .. })
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("listen_port = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
