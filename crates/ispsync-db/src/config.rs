//! Connection settings for an ISP back-office database

use crate::dialect::{Dialect, MySqlDialect, PostgresDialect, SqlServerDialect};
use crate::error::DbError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    #[default]
    #[serde(alias = "postgres")]
    Postgresql,
    Mysql,
    #[serde(alias = "mssql")]
    Sqlserver,
}

impl DatabaseEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseEngine::Postgresql => "postgresql",
            DatabaseEngine::Mysql => "mysql",
            DatabaseEngine::Sqlserver => "sqlserver",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseEngine::Postgresql => 5432,
            DatabaseEngine::Mysql => 3306,
            DatabaseEngine::Sqlserver => 1433,
        }
    }

    /// SQL dialect spoken by this engine
    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            DatabaseEngine::Postgresql => &PostgresDialect,
            DatabaseEngine::Mysql => &MySqlDialect,
            DatabaseEngine::Sqlserver => &SqlServerDialect,
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseEngine {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseEngine::Postgresql),
            "mysql" => Ok(DatabaseEngine::Mysql),
            "sqlserver" | "mssql" => Ok(DatabaseEngine::Sqlserver),
            other => Err(DbError::Connection(format!(
                "unsupported database engine '{}'",
                other
            ))),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_query_timeout_secs() -> u64 {
    30
}

/// One configured ISP database
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default, rename = "dbType", alias = "db_type", alias = "engine")]
    pub engine: DatabaseEngine,

    pub host: String,

    /// Falls back to the engine's default port when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    pub database: String,

    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Upper bound on a single statement, including its transaction
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Accept the server certificate without validation (SQL Server only)
    #[serde(default)]
    pub trust_cert: bool,
}

impl DatabaseConfig {
    pub fn new(engine: DatabaseEngine, host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            engine,
            host: host.into(),
            port: None,
            database: database.into(),
            username: String::new(),
            password: String::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            trust_cert: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_trust_cert(mut self, trust_cert: bool) -> Self {
        self.trust_cert = trust_cert;
        self
    }

    pub fn with_query_timeout(mut self, secs: u64) -> Self {
        self.query_timeout_secs = secs;
        self
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine.default_port())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("trust_cert", &self.trust_cert)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let pg = DatabaseConfig::new(DatabaseEngine::Postgresql, "h", "d");
        let my = DatabaseConfig::new(DatabaseEngine::Mysql, "h", "d");
        let ms = DatabaseConfig::new(DatabaseEngine::Sqlserver, "h", "d");

        assert_eq!(pg.port(), 5432);
        assert_eq!(my.port(), 3306);
        assert_eq!(ms.port(), 1433);
        assert_eq!(ms.with_port(14330).port(), 14330);
        assert_eq!(pg.connect_timeout(), Duration::from_secs(10));
        assert_eq!(pg.query_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_deserialize_wire_shape() {
        let yaml = r#"
dbType: mysql
host: billing.isp.local
database: radius
username: sync
password: hunter2
"#;
        let config: DatabaseConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.engine, DatabaseEngine::Mysql);
        assert_eq!(config.port(), 3306);
        assert_eq!(config.password, "hunter2");
        assert!(!config.trust_cert);
        assert_eq!(config.query_timeout_secs, 30);
    }

    #[test]
    fn test_engine_aliases() {
        let config: DatabaseConfig =
            serde_yaml::from_str("dbType: mssql\nhost: h\ndatabase: d\n").unwrap();
        assert_eq!(config.engine, DatabaseEngine::Sqlserver);

        let config: DatabaseConfig = serde_yaml::from_str("host: h\ndatabase: d\n").unwrap();
        assert_eq!(config.engine, DatabaseEngine::Postgresql);

        assert_eq!("postgres".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::Postgresql);
        assert!("oracle".parse::<DatabaseEngine>().is_err());
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let result = serde_yaml::from_str::<DatabaseConfig>("dbType: sqlite\nhost: h\ndatabase: d\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = DatabaseConfig::new(DatabaseEngine::Postgresql, "h", "d")
            .with_credentials("u", "topsecret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("topsecret"));
        assert!(rendered.contains("5432"));
    }
}
