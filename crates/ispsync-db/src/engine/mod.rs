//! Wire drivers for the supported engines
//!
//! Each engine implements [`EngineSession`] over a single exclusively owned
//! connection. Every `execute` runs in its own transaction: committed when
//! the statement and row decoding succeed, rolled back otherwise. A
//! `read_only` transaction is never committed.

mod mysql;
mod postgres;
mod sqlserver;

pub use mysql::MySqlSession;
pub use postgres::PostgresSession;
pub use sqlserver::SqlServerSession;

use crate::{
    Result,
    config::{DatabaseConfig, DatabaseEngine},
    error::DbError,
    value::{ResultSet, Row, SqlValue},
};
use async_trait::async_trait;

/// One open connection to a database engine
#[async_trait]
pub trait EngineSession: Send {
    fn engine(&self) -> DatabaseEngine;

    /// Round-trip `SELECT 1`
    async fn ping(&mut self) -> Result<()>;

    /// Run `query` with positional `params` inside a transaction and return
    /// its rows in projection order
    async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run `query` in a transaction the engine holds read-only where it
    /// can, and roll it back whatever happens
    async fn read_only(&mut self, query: &str) -> Result<ResultSet>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Open a session with the driver for `config.engine`
pub async fn open(config: &DatabaseConfig) -> Result<Box<dyn EngineSession>> {
    let session: Box<dyn EngineSession> = match config.engine {
        DatabaseEngine::Postgresql => Box::new(PostgresSession::connect(config).await?),
        DatabaseEngine::Mysql => Box::new(MySqlSession::connect(config).await?),
        DatabaseEngine::Sqlserver => Box::new(SqlServerSession::connect(config).await?),
    };
    Ok(session)
}

/// Map a sqlx failure: broken transports lose the session, everything
/// else is a failed statement
pub(crate) fn sqlx_error(query: &str, err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => DbError::Connection(err.to_string()),
        other => DbError::query(query, other),
    }
}

/// Wrap a row decoding failure so it reads like any other statement failure
pub(crate) fn decode_failure(query: &str, err: DbError) -> DbError {
    match err {
        DbError::QueryExecution { .. } | DbError::Connection(_) => err,
        other => DbError::query(query, other),
    }
}
