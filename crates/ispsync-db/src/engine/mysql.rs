use super::{EngineSession, decode_failure, sqlx_error};
use crate::{
    Result,
    config::{DatabaseConfig, DatabaseEngine},
    error::DbError,
    value::{ResultSet, Row, SqlValue},
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, MySql, Row as _, Statement, TypeInfo, ValueRef};
use tracing::{debug, warn};

/// MySQL session over a single sqlx connection
pub struct MySqlSession {
    conn: MySqlConnection,
}

impl MySqlSession {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port())
            .database(&config.database)
            .username(&config.username)
            .password(&config.password);

        let conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| DbError::Connection(format!("Failed to connect to MySQL: {}", e)))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl EngineSession for MySqlSession {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Mysql
    }

    async fn ping(&mut self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&mut self.conn)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut tx = self.conn.begin().await.map_err(|e| sqlx_error(query, e))?;

        let outcome = match bind_all(query, params).fetch_all(&mut *tx).await {
            Ok(rows) => rows
                .iter()
                .map(decode_row)
                .collect::<Result<Vec<_>>>()
                .map_err(|e| decode_failure(query, e)),
            Err(e) => Err(sqlx_error(query, e)),
        };

        match outcome {
            Ok(rows) => {
                tx.commit().await.map_err(|e| sqlx_error(query, e))?;
                debug!(rows = rows.len(), "mysql statement committed");
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("MySQL rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn read_only(&mut self, query: &str) -> Result<ResultSet> {
        // Applies to the next transaction only
        (&mut self.conn)
            .execute("SET TRANSACTION READ ONLY")
            .await
            .map_err(|e| sqlx_error(query, e))?;
        let mut tx = self.conn.begin().await.map_err(|e| sqlx_error(query, e))?;
        let outcome = read_in(&mut tx, query).await;

        if let Err(rollback) = tx.rollback().await {
            warn!("MySQL rollback failed: {}", rollback);
        }
        outcome
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))
    }
}

async fn read_in(conn: &mut MySqlConnection, query: &str) -> Result<ResultSet> {
    let statement = (&mut *conn)
        .prepare(query)
        .await
        .map_err(|e| sqlx_error(query, e))?;
    let columns = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let rows = statement
        .query()
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| sqlx_error(query, e))?
        .iter()
        .map(decode_row)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| decode_failure(query, e))?;

    Ok(ResultSet::new(columns, rows))
}

fn bind_all<'q>(query: &'q str, params: &'q [SqlValue]) -> Query<'q, MySql, MySqlArguments> {
    params.iter().fold(sqlx::query(query), |q, param| match param {
        SqlValue::Null => q.bind(None::<String>),
        SqlValue::Bool(v) => q.bind(*v),
        SqlValue::Int(v) => q.bind(*v),
        SqlValue::Float(v) => q.bind(*v),
        SqlValue::Decimal(v) => q.bind(*v),
        SqlValue::Text(v) => q.bind(v.as_str()),
        SqlValue::Bytes(v) => q.bind(v.as_slice()),
        SqlValue::Date(v) => q.bind(*v),
        SqlValue::Timestamp(v) => q.bind(*v),
        SqlValue::TimestampTz(v) => q.bind(*v),
        SqlValue::Json(v) => q.bind(sqlx::types::Json(v)),
        SqlValue::Uuid(v) => q.bind(v.to_string()),
    })
}

fn decode_row(row: &MySqlRow) -> Result<Row> {
    let mut out = Row::with_capacity(row.len());
    for column in row.columns() {
        let value = decode_value(row, column.ordinal(), column.type_info().name())
            .map_err(|e| DbError::decode(column.name(), e.to_string()))?;
        out.push(column.name(), value);
    }
    Ok(out)
}

fn decode_value(row: &MySqlRow, idx: usize, type_name: &str) -> std::result::Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let value = match type_name {
        "BOOLEAN" => SqlValue::Bool(row.try_get(idx)?),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => {
            let v: u64 = row.try_get(idx)?;
            i64::try_from(v).map_or_else(|_| SqlValue::Decimal(Decimal::from(v)), SqlValue::Int)
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => SqlValue::Int(row.try_get(idx)?),
        "FLOAT" => SqlValue::Float(row.try_get::<f32, _>(idx)?.into()),
        "DOUBLE" => SqlValue::Float(row.try_get(idx)?),
        "DECIMAL" => SqlValue::Decimal(row.try_get::<Decimal, _>(idx)?),
        "DATE" => SqlValue::Date(row.try_get::<NaiveDate, _>(idx)?),
        "TIME" => SqlValue::Text(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        "DATETIME" => SqlValue::Timestamp(row.try_get::<NaiveDateTime, _>(idx)?),
        "TIMESTAMP" => SqlValue::TimestampTz(row.try_get::<DateTime<Utc>, _>(idx)?),
        "JSON" => SqlValue::Json(row.try_get(idx)?),
        // information_schema text columns are reported as binary on some servers
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            match row.try_get::<String, _>(idx) {
                Ok(text) => SqlValue::Text(text),
                Err(_) => SqlValue::Bytes(row.try_get(idx)?),
            }
        }
        _ => SqlValue::Text(row.try_get(idx)?),
    };
    Ok(value)
}
