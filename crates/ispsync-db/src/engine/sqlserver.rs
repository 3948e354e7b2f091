use super::{EngineSession, decode_failure};
use crate::{
    Result,
    config::{DatabaseConfig, DatabaseEngine},
    error::DbError,
    value::{ResultSet, Row, SqlValue},
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::borrow::Cow;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

/// SQL Server session over a tiberius client
pub struct SqlServerSession {
    client: Client<Compat<TcpStream>>,
}

impl SqlServerSession {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut tds = Config::new();
        tds.host(&config.host);
        tds.port(config.port());
        tds.database(&config.database);
        tds.authentication(AuthMethod::sql_server(&config.username, &config.password));
        tds.application_name("ispsync");
        if config.trust_cert {
            tds.trust_cert();
        }

        let client = match Client::connect(tds.clone(), open_tcp(&tds).await?).await {
            Ok(client) => client,
            // Azure SQL redirects to the node that owns the database
            Err(tiberius::error::Error::Routing { host, port }) => {
                info!(%host, port, "SQL Server redirected connection");
                tds.host(&host);
                tds.port(port);
                Client::connect(tds.clone(), open_tcp(&tds).await?)
                    .await
                    .map_err(connect_error)?
            }
            Err(e) => return Err(connect_error(e)),
        };
        Ok(Self { client })
    }

    async fn simple(&mut self, statement: &str) -> Result<()> {
        self.client
            .simple_query(statement)
            .await
            .map_err(|e| tds_error(statement, e))?
            .into_results()
            .await
            .map_err(|e| tds_error(statement, e))?;
        Ok(())
    }

    /// First result set of `query`, with its column names
    async fn run(&mut self, query: &str, params: &[SqlValue]) -> Result<ResultSet> {
        let args: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let mut stream = self
            .client
            .query(query, &args)
            .await
            .map_err(|e| tds_error(query, e))?;

        let columns = stream
            .columns()
            .await
            .map_err(|e| tds_error(query, e))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| tds_error(query, e))?
            .into_iter()
            .map(decode_row)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| decode_failure(query, e))?;

        Ok(ResultSet::new(columns, rows))
    }

    async fn rollback(&mut self) {
        if let Err(e) = self.simple("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await {
            warn!("SQL Server rollback failed: {}", e);
        }
    }
}

#[async_trait]
impl EngineSession for SqlServerSession {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Sqlserver
    }

    async fn ping(&mut self) -> Result<()> {
        self.simple("SELECT 1").await.map_err(|e| DbError::Connection(e.to_string()))
    }

    async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.simple("BEGIN TRANSACTION").await?;

        match self.run(query, params).await {
            Ok(result) => {
                self.simple("COMMIT TRANSACTION").await?;
                debug!(rows = result.rows.len(), "sqlserver statement committed");
                Ok(result.rows)
            }
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }

    /// SQL Server has no read-only transaction mode, so anything the
    /// statement wrote is undone by the unconditional rollback
    async fn read_only(&mut self, query: &str) -> Result<ResultSet> {
        self.simple("BEGIN TRANSACTION").await?;
        let outcome = self.run(query, &[]).await;
        self.rollback().await;
        outcome
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))
    }
}

async fn open_tcp(tds: &Config) -> Result<Compat<TcpStream>> {
    let tcp = TcpStream::connect(tds.get_addr())
        .await
        .map_err(|e| DbError::Connection(format!("Failed to reach SQL Server: {}", e)))?;
    tcp.set_nodelay(true)
        .map_err(|e| DbError::Connection(e.to_string()))?;
    Ok(tcp.compat_write())
}

fn connect_error(err: tiberius::error::Error) -> DbError {
    DbError::Connection(format!("Failed to connect to SQL Server: {}", err))
}

fn tds_error(query: &str, err: tiberius::error::Error) -> DbError {
    match err {
        tiberius::error::Error::Io { .. }
        | tiberius::error::Error::Tls(_)
        | tiberius::error::Error::Protocol(_) => DbError::Connection(err.to_string()),
        other => DbError::query(query, other),
    }
}

fn decode_row(row: tiberius::Row) -> Result<Row> {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut out = Row::with_capacity(names.len());
    for (name, data) in names.into_iter().zip(row) {
        let value = from_column_data(data).map_err(|e| DbError::decode(&name, e.to_string()))?;
        out.push(name, value);
    }
    Ok(out)
}

fn from_column_data(data: ColumnData<'static>) -> tiberius::Result<SqlValue> {
    let value = match data {
        ColumnData::U8(v) => v.map_or(SqlValue::Null, |v| SqlValue::Int(v.into())),
        ColumnData::I16(v) => v.map_or(SqlValue::Null, |v| SqlValue::Int(v.into())),
        ColumnData::I32(v) => v.map_or(SqlValue::Null, |v| SqlValue::Int(v.into())),
        ColumnData::I64(v) => v.map_or(SqlValue::Null, SqlValue::Int),
        ColumnData::F32(v) => v.map_or(SqlValue::Null, |v| SqlValue::Float(v.into())),
        ColumnData::F64(v) => v.map_or(SqlValue::Null, SqlValue::Float),
        ColumnData::Bit(v) => v.map_or(SqlValue::Null, SqlValue::Bool),
        ColumnData::String(v) => v.map_or(SqlValue::Null, |s| SqlValue::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map_or(SqlValue::Null, SqlValue::Uuid),
        ColumnData::Binary(v) => v.map_or(SqlValue::Null, |b| SqlValue::Bytes(b.into_owned())),
        ColumnData::Xml(v) => {
            v.map_or(SqlValue::Null, |x| SqlValue::Text(x.into_owned().into_string()))
        }
        data @ ColumnData::Numeric(_) => {
            Decimal::from_sql(&data)?.map_or(SqlValue::Null, SqlValue::Decimal)
        }
        data @ ColumnData::Date(_) => {
            NaiveDate::from_sql(&data)?.map_or(SqlValue::Null, SqlValue::Date)
        }
        data @ ColumnData::Time(_) => NaiveTime::from_sql(&data)?
            .map_or(SqlValue::Null, |t| SqlValue::Text(t.to_string())),
        data @ (ColumnData::DateTime(_)
        | ColumnData::SmallDateTime(_)
        | ColumnData::DateTime2(_)) => {
            NaiveDateTime::from_sql(&data)?.map_or(SqlValue::Null, SqlValue::Timestamp)
        }
        data @ ColumnData::DateTimeOffset(_) => {
            DateTime::<Utc>::from_sql(&data)?.map_or(SqlValue::Null, SqlValue::TimestampTz)
        }
    };
    Ok(value)
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            SqlValue::Null => ColumnData::String(None),
            SqlValue::Bool(v) => v.to_sql(),
            SqlValue::Int(v) => v.to_sql(),
            SqlValue::Float(v) => v.to_sql(),
            SqlValue::Decimal(v) => v.to_sql(),
            SqlValue::Text(v) => v.to_sql(),
            SqlValue::Bytes(v) => v.to_sql(),
            SqlValue::Date(v) => v.to_sql(),
            SqlValue::Timestamp(v) => v.to_sql(),
            SqlValue::TimestampTz(v) => v.to_sql(),
            SqlValue::Json(v) => ColumnData::String(Some(Cow::Owned(v.to_string()))),
            SqlValue::Uuid(v) => v.to_sql(),
        }
    }
}
