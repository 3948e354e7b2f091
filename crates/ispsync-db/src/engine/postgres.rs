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
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgConnection, PgRow, PgTypeInfo,
};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, Postgres, Row as _, Statement, Type, TypeInfo, ValueRef};
use tracing::{debug, warn};

/// PostgreSQL session over a single sqlx connection
pub struct PostgresSession {
    conn: PgConnection,
}

impl PostgresSession {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port())
            .database(&config.database)
            .username(&config.username)
            .password(&config.password)
            .application_name("ispsync");

        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| DbError::Connection(format!("Failed to connect to PostgreSQL: {}", e)))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl EngineSession for PostgresSession {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Postgresql
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
                debug!(rows = rows.len(), "postgres statement committed");
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("PostgreSQL rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn read_only(&mut self, query: &str) -> Result<ResultSet> {
        let mut tx = self.conn.begin().await.map_err(|e| sqlx_error(query, e))?;
        let outcome = read_in(&mut tx, query).await;

        if let Err(rollback) = tx.rollback().await {
            warn!("PostgreSQL rollback failed: {}", rollback);
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

/// Read inside an open transaction; writes fail with "cannot execute ... in
/// a read-only transaction"
async fn read_in(conn: &mut PgConnection, query: &str) -> Result<ResultSet> {
    (&mut *conn)
        .execute("SET TRANSACTION READ ONLY")
        .await
        .map_err(|e| sqlx_error(query, e))?;

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

/// NULL sent with the unspecified type oid, so the server infers the
/// parameter's type from the statement
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(
        &self,
        _buf: &mut PgArgumentBuffer,
    ) -> std::result::Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

fn bind_all<'q>(query: &'q str, params: &'q [SqlValue]) -> Query<'q, Postgres, PgArguments> {
    params.iter().fold(sqlx::query(query), |q, param| match param {
        SqlValue::Null => q.bind(UntypedNull),
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
        SqlValue::Uuid(v) => q.bind(*v),
    })
}

fn decode_row(row: &PgRow) -> Result<Row> {
    let mut out = Row::with_capacity(row.len());
    for column in row.columns() {
        let value = decode_value(row, column.ordinal(), column.type_info().name())
            .map_err(|e| DbError::decode(column.name(), e.to_string()))?;
        out.push(column.name(), value);
    }
    Ok(out)
}

fn decode_value(row: &PgRow, idx: usize, type_name: &str) -> std::result::Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let value = match type_name {
        "BOOL" => SqlValue::Bool(row.try_get(idx)?),
        "INT2" => SqlValue::Int(row.try_get::<i16, _>(idx)?.into()),
        "INT4" => SqlValue::Int(row.try_get::<i32, _>(idx)?.into()),
        "INT8" => SqlValue::Int(row.try_get(idx)?),
        "OID" => SqlValue::Int(row.try_get::<sqlx::postgres::types::Oid, _>(idx)?.0.into()),
        "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(idx)?.into()),
        "FLOAT8" => SqlValue::Float(row.try_get(idx)?),
        "NUMERIC" => SqlValue::Decimal(row.try_get::<Decimal, _>(idx)?),
        "BYTEA" => SqlValue::Bytes(row.try_get(idx)?),
        "DATE" => SqlValue::Date(row.try_get::<NaiveDate, _>(idx)?),
        "TIME" => SqlValue::Text(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        "TIMESTAMP" => SqlValue::Timestamp(row.try_get::<NaiveDateTime, _>(idx)?),
        "TIMESTAMPTZ" => SqlValue::TimestampTz(row.try_get::<DateTime<Utc>, _>(idx)?),
        "JSON" | "JSONB" => SqlValue::Json(row.try_get(idx)?),
        "UUID" => SqlValue::Uuid(row.try_get(idx)?),
        // TEXT, VARCHAR, BPCHAR, NAME and anything sqlx can read as text
        _ => SqlValue::Text(row.try_get(idx)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_parameter_is_untyped() {
        assert_eq!(<UntypedNull as Type<Postgres>>::type_info().oid(), Some(Oid(0)));
    }
}
