use ispsync_db::DatabaseConfig;
use ispsync_egress::ProviderConnection;
use ispsync_egress::config::ConnectionConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Provider '{name}': {source}")]
    Provider {
        name: String,
        #[source]
        source: ConnectionConfigError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// External provider connections swept at startup
    #[serde(default)]
    pub providers: Vec<ProviderConnection>,

    /// ISP database checked at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            logging: LoggingConfig::default(),
            providers: Vec::new(),
            database: None,
            cache: CacheConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl ServerConfig {
    /// Load from YAML, or TOML when the file ends in `.toml`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)?
        } else {
            serde_yaml::from_str(&contents)?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("ISPSYNC_HOST") {
            self.host = val;
        }

        if let Ok(val) = std::env::var("ISPSYNC_PORT") {
            match val.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => eprintln!("Warning: Invalid ISPSYNC_PORT '{}', keeping {}", val, self.port),
            }
        }

        if let Ok(val) = std::env::var("ISPSYNC_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("ISPSYNC_LOG_JSON") {
            if let Ok(json) = val.parse::<bool>() {
                self.logging.json = json;
            }
        }
    }

    /// Expand `$VAR` / `${VAR}` references in provider credentials
    pub fn resolve_secrets(&mut self) -> Result<(), ConfigError> {
        for provider in &mut self.providers {
            provider
                .resolve_env_vars()
                .map_err(|source| ConfigError::Provider {
                    name: provider.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ispsync_db::DatabaseEngine;
    use ispsync_egress::ProviderKind;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8090);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.realtime.enabled);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert!(config.providers.is_empty());
        assert!(config.database.is_none());
    }

    #[test]
    fn test_load_yaml() {
        let file = write_config(
            ".yaml",
            r#"
port: 9000
logging:
  level: debug
  json: true
providers:
  - name: Safaricom Main
    provider_type: safaricom
    api_endpoint: https://api.safaricom.example
    api_key: key-1
  - name: Vendor
    provider_type: data_vendor
    endpoint: https://vendor.example
database:
  dbType: mysql
  host: db.isp.local
  database: billing
  username: sync
  password: secret
cache:
  ttl_secs: 60
realtime:
  enabled: false
"#,
        );

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].provider_kind, ProviderKind::Safaricom);
        assert_eq!(config.providers[1].provider_kind, ProviderKind::DataVendor);

        let database = config.database.unwrap();
        assert_eq!(database.engine, DatabaseEngine::Mysql);
        assert_eq!(database.port(), 3306);
        assert_eq!(config.cache.ttl_secs, 60);
        assert!(!config.realtime.enabled);
    }

    #[test]
    fn test_load_toml() {
        let file = write_config(
            ".toml",
            r#"
host = "0.0.0.0"
port = 8443

[logging]
level = "warn"

[[providers]]
name = "Airtel"
provider_type = "airtel"
endpoint = "https://airtel.example"
"#,
        );

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8443);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.providers[0].provider_kind, ProviderKind::Airtel);
        assert!(config.realtime.enabled);
    }

    #[test]
    fn test_unknown_provider_kind_is_rejected() {
        let file = write_config(
            ".yaml",
            r#"
providers:
  - name: Mystery
    provider_type: telkom
    endpoint: https://x.example
"#,
        );
        assert!(matches!(
            ServerConfig::from_file(file.path()),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServerConfig::from_file("/nonexistent/ispsync.yaml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides_take_precedence() {
        unsafe {
            std::env::set_var("ISPSYNC_HOST", "0.0.0.0");
            std::env::set_var("ISPSYNC_PORT", "7000");
            std::env::set_var("ISPSYNC_LOG_LEVEL", "trace");
            std::env::set_var("ISPSYNC_LOG_JSON", "true");
        }

        let file = write_config(".yaml", "host: 10.0.0.1\nport: 9000\n");
        let mut config = ServerConfig::from_file(file.path()).unwrap();
        config.merge_env();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7000);
        assert_eq!(config.logging.level, "trace");
        assert!(config.logging.json);

        unsafe {
            std::env::remove_var("ISPSYNC_HOST");
            std::env::remove_var("ISPSYNC_PORT");
            std::env::remove_var("ISPSYNC_LOG_LEVEL");
            std::env::remove_var("ISPSYNC_LOG_JSON");
        }
    }

    #[test]
    #[serial]
    fn test_invalid_port_override_is_ignored() {
        unsafe {
            std::env::set_var("ISPSYNC_PORT", "not-a-port");
        }
        let mut config = ServerConfig::default();
        config.merge_env();
        assert_eq!(config.port, 8090);
        unsafe {
            std::env::remove_var("ISPSYNC_PORT");
        }
    }

    #[test]
    #[serial]
    fn test_resolve_secrets() {
        unsafe {
            std::env::set_var("ISPSYNC_TEST_MTN_KEY", "mtn-secret");
        }
        let mut config = ServerConfig::default();
        config.providers.push(
            ProviderConnection::new("MTN", ProviderKind::Mtn, "https://mtn.example")
                .with_api_key("${ISPSYNC_TEST_MTN_KEY}"),
        );
        config.resolve_secrets().unwrap();
        assert_eq!(config.providers[0].api_key.as_deref(), Some("mtn-secret"));

        config.providers[0].api_key = Some("$ISPSYNC_TEST_UNSET_KEY".into());
        assert!(matches!(
            config.resolve_secrets(),
            Err(ConfigError::Provider { .. })
        ));
        unsafe {
            std::env::remove_var("ISPSYNC_TEST_MTN_KEY");
        }
    }
}
