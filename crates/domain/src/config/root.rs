use serde::{Deserialize, Serialize};

use super::cache::CacheConfig;
use super::errors::ConfigError;
use super::logging::LoggingConfig;
use super::server::ServerConfig;
use super::upstream::UpstreamConfig;

/// Main configuration structure for Conduit DNS.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file or use defaults.
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. conduit-dns.toml in current directory
    /// 3. /etc/conduit-dns/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if std::path::Path::new("conduit-dns.toml").exists() {
            Self::from_file("conduit-dns.toml")?
        } else if std::path::Path::new("/etc/conduit-dns/config.toml").exists() {
            Self::from_file("/etc/conduit-dns/config.toml")?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_toml_str(&contents)
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(upstreams) = overrides.upstreams {
            self.upstream.targets = upstreams
                .into_iter()
                .map(|address| super::upstream::UpstreamTargetConfig {
                    address,
                    transport: Default::default(),
                })
                .collect();
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// The server refuses to start on an invalid configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("DNS port cannot be 0".to_string()));
        }

        if self.upstream.targets.is_empty() {
            return Err(ConfigError::Validation(
                "No upstream servers configured".to_string(),
            ));
        }

        for target in &self.upstream.targets {
            if target.address.parse::<std::net::SocketAddr>().is_err() {
                return Err(ConfigError::Validation(format!(
                    "Invalid upstream address '{}': expected ip:port",
                    target.address
                )));
            }
        }

        if self.upstream.attempts_per_target == 0 {
            return Err(ConfigError::Validation(
                "attempts_per_target must be at least 1".to_string(),
            ));
        }

        if self.upstream.query_timeout_ms == 0 || self.upstream.exchange_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "query and exchange timeouts must be non-zero".to_string(),
            ));
        }

        if self.server.shutdown_grace_secs == 0 {
            return Err(ConfigError::Validation(
                "server.shutdown_grace_secs must be non-zero".to_string(),
            ));
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::Validation(
                "cache.max_entries must be non-zero when the cache is enabled".to_string(),
            ));
        }

        if self.cache.ttl_min_secs > self.cache.ttl_max_secs {
            return Err(ConfigError::Validation(format!(
                "cache.ttl_min_secs ({}) exceeds cache.ttl_max_secs ({})",
                self.cache.ttl_min_secs, self.cache.ttl_max_secs
            )));
        }

        Ok(())
    }
}

/// Command-line overrides for configuration.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub upstreams: Option<Vec<String>>,
    pub log_level: Option<String>,
}
