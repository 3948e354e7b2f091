//! Engine-neutral relational connector

use crate::{
    Result,
    config::DatabaseConfig,
    dialect::Dialect,
    engine::{self, EngineSession},
    error::DbError,
    value::{ResultSet, Row, SqlValue},
};
use async_trait::async_trait;
use serde::Serialize;
use tokio::time::error::Elapsed;
use tracing::{debug, error, info, instrument, warn};

/// Anything that can run parameterized SQL for the orchestrator
#[async_trait]
pub trait QueryExecutor: Send {
    fn dialect(&self) -> &'static dyn Dialect;

    /// Run `query` with positional `params`; see
    /// [`RelationalConnector::execute`]
    async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run `query` without letting it change anything; see
    /// [`RelationalConnector::read_only`]
    async fn read_only(&mut self, query: &str) -> Result<ResultSet>;

    /// Column names, types and nullability of `table`
    ///
    /// # Errors
    /// - `DbError::TableNotFound` if the table has no columns in the catalog
    async fn introspect(&mut self, table: &str) -> Result<TableInfo> {
        let query = self.dialect().columns_query();
        let rows = self.execute(&query, &[SqlValue::from(table)]).await?;
        if rows.is_empty() {
            return Err(DbError::TableNotFound(table.to_string()));
        }

        let columns = rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.text("column_name").unwrap_or_default(),
                data_type: row.text("data_type").unwrap_or_default(),
                nullable: row
                    .text("is_nullable")
                    .is_none_or(|n| n.eq_ignore_ascii_case("YES")),
            })
            .collect();

        Ok(TableInfo {
            table_name: table.to_string(),
            columns,
        })
    }
}

/// One column of an introspected table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

/// Schema of an introspected table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connected,
}

/// Connection to one configured database.
///
/// Owns at most one engine session. Not shareable across concurrent
/// callers; every operation takes `&mut self`.
pub struct RelationalConnector {
    config: DatabaseConfig,
    dialect: &'static dyn Dialect,
    session: Option<Box<dyn EngineSession>>,
}

impl RelationalConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        let dialect = config.engine.dialect();
        Self {
            config,
            dialect,
            session: None,
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectorState {
        if self.session.is_some() {
            ConnectorState::Connected
        } else {
            ConnectorState::Disconnected
        }
    }

    /// Open the session if there is none. A no-op when already connected.
    ///
    /// # Errors
    /// - `DbError::Timeout` if the server does not answer within the
    ///   configured connect timeout
    /// - `DbError::Connection` if the driver cannot connect or `SELECT 1`
    ///   fails
    #[instrument(skip(self), fields(engine = %self.config.engine, host = %self.config.host))]
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let config = &self.config;
        let attempt = async {
            let mut session = engine::open(config).await?;
            session.ping().await?;
            Ok::<_, DbError>(session)
        };

        match tokio::time::timeout(config.connect_timeout(), attempt).await {
            Ok(Ok(session)) => {
                info!(
                    "Connected to {} database at {}",
                    self.config.engine, self.config.host
                );
                self.session = Some(session);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Database connection failed: {}", e);
                Err(e)
            }
            Err(_) => {
                error!(
                    "Database connection timed out after {}s",
                    self.config.connect_timeout_secs
                );
                Err(DbError::Timeout(self.config.connect_timeout_secs))
            }
        }
    }

    /// Close the session. Safe to call when already disconnected.
    pub async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Error while closing database session: {}", e);
            }
            debug!(engine = %self.config.engine, "database session closed");
        }
    }

    /// Run one statement, connecting first if needed.
    ///
    /// Row-producing statements return their rows in projection order;
    /// other statements commit and return an empty list. On failure the
    /// transaction is rolled back and the driver's error is kept as the
    /// source of `DbError::QueryExecution`. A lost connection leaves the
    /// connector disconnected so the next call reconnects.
    ///
    /// # Errors
    /// - `DbError::Timeout` if the statement outlives the query timeout;
    ///   the session is dropped, which aborts its transaction
    pub async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let limit = self.config.query_timeout();
        let session = self.session().await?;
        let outcome = tokio::time::timeout(limit, session.execute(query, params)).await;
        self.settle(outcome)
    }

    /// Run `query` in a transaction that is always rolled back, held
    /// read-only by engines that support it. Column names come back even
    /// when no row does.
    pub async fn read_only(&mut self, query: &str) -> Result<ResultSet> {
        let limit = self.config.query_timeout();
        let session = self.session().await?;
        let outcome = tokio::time::timeout(limit, session.read_only(query)).await;
        self.settle(outcome)
    }

    async fn session(&mut self) -> Result<&mut Box<dyn EngineSession>> {
        self.connect().await?;
        self.session.as_mut().ok_or_else(|| {
            DbError::Connection("Database connection not established".to_string())
        })
    }

    fn settle<T>(&mut self, outcome: std::result::Result<Result<T>, Elapsed>) -> Result<T> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("Query execution failed: {}", e);
                if e.is_connection_lost() {
                    self.session = None;
                }
                Err(e)
            }
            Err(_) => {
                let secs = self.config.query_timeout_secs;
                error!("Query timed out after {}s; dropping the session", secs);
                self.session = None;
                Err(DbError::Timeout(secs))
            }
        }
    }

    #[cfg(test)]
    fn with_session(config: DatabaseConfig, session: Box<dyn EngineSession>) -> Self {
        let mut connector = Self::new(config);
        connector.session = Some(session);
        connector
    }
}

#[async_trait]
impl QueryExecutor for RelationalConnector {
    fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        RelationalConnector::execute(self, query, params).await
    }

    async fn read_only(&mut self, query: &str) -> Result<ResultSet> {
        RelationalConnector::read_only(self, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseEngine;
    use std::time::Duration;

    /// Session whose statements never finish in time
    struct StalledSession;

    #[async_trait]
    impl EngineSession for StalledSession {
        fn engine(&self) -> DatabaseEngine {
            DatabaseEngine::Postgresql
        }

        async fn ping(&mut self) -> Result<()> {
            Ok(())
        }

        async fn execute(&mut self, _query: &str, _params: &[SqlValue]) -> Result<Vec<Row>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        async fn read_only(&mut self, _query: &str) -> Result<ResultSet> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ResultSet::default())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn stalled_connector() -> RelationalConnector {
        let config = DatabaseConfig::new(DatabaseEngine::Postgresql, "127.0.0.1", "billing")
            .with_query_timeout(1);
        RelationalConnector::with_session(config, Box::new(StalledSession))
    }

    #[tokio::test]
    async fn test_starts_disconnected_and_disconnect_is_idempotent() {
        let mut connector =
            RelationalConnector::new(DatabaseConfig::new(DatabaseEngine::Mysql, "127.0.0.1", "x"));
        assert_eq!(connector.state(), ConnectorState::Disconnected);

        connector.disconnect().await;
        connector.disconnect().await;
        assert_eq!(connector.state(), ConnectorState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure_stays_disconnected() {
        // Nothing listens on the discard port
        let config = DatabaseConfig::new(DatabaseEngine::Postgresql, "127.0.0.1", "billing")
            .with_port(9)
            .with_credentials("u", "p");
        let mut connector = RelationalConnector::new(config);

        let err = connector.connect().await.unwrap_err();
        assert!(err.is_connection_lost());
        assert_eq!(connector.state(), ConnectorState::Disconnected);

        let err = connector.execute("SELECT 1", &[]).await.unwrap_err();
        assert!(err.is_connection_lost());
    }

    #[tokio::test]
    async fn test_slow_statement_times_out_and_drops_session() {
        let mut connector = stalled_connector();
        assert_eq!(connector.state(), ConnectorState::Connected);

        let err = connector
            .execute("SELECT pg_sleep(38)", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Timeout(1)));
        assert_eq!(connector.state(), ConnectorState::Disconnected);
    }

    #[tokio::test]
    async fn test_slow_read_times_out_and_drops_session() {
        let mut connector = stalled_connector();

        let err = connector.read_only("SELECT pg_sleep(38)").await.unwrap_err();
        assert!(matches!(err, DbError::Timeout(1)));
        assert_eq!(connector.state(), ConnectorState::Disconnected);
    }

    #[test]
    fn test_dialect_follows_engine() {
        let connector =
            RelationalConnector::new(DatabaseConfig::new(DatabaseEngine::Sqlserver, "h", "d"));
        assert_eq!(QueryExecutor::dialect(&connector).placeholder(1), "@P1");
    }
}
