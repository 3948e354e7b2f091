//! Sync orchestration over an ISP database
//!
//! Read paths (`get_balance`, `get_usage`, `sync_customers`,
//! `import_transactions`) never fail: they log the cause and fall back to
//! zero or an empty list so dashboards can show partial data. `test`,
//! `export` and `introspect` return errors to the caller.

use crate::{
    Result,
    cascade::{self, CascadeOutcome},
    config::DatabaseConfig,
    connector::{QueryExecutor, RelationalConnector, TableInfo},
    error::DbError,
    models::{CanonicalCustomer, CanonicalTransaction, CustomerUsage, TransactionType},
    value::{ResultSet, Row, SqlValue},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use tracing::{error, info, instrument, warn};

/// Maximum customers pulled per sync
pub const CUSTOMER_SYNC_LIMIT: u32 = 1000;

/// Result of a successful connection test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub version: String,
    pub table_count: i64,
    pub database: String,
    pub host: String,
}

/// A query result rendered as CSV
#[derive(Debug, Clone, PartialEq)]
pub struct TabularExport {
    pub filename: String,
    pub content: String,
    pub row_count: usize,
}

/// Drives balance discovery, customer/transaction sync and export against
/// one database. Owns its executor exclusively.
pub struct SyncOrchestrator<E: QueryExecutor = RelationalConnector> {
    executor: E,
    database: String,
    host: String,
}

impl SyncOrchestrator<RelationalConnector> {
    pub fn new(config: DatabaseConfig) -> Self {
        let database = config.database.clone();
        let host = config.host.clone();
        Self {
            executor: RelationalConnector::new(config),
            database,
            host,
        }
    }

    pub async fn disconnect(&mut self) {
        self.executor.disconnect().await;
    }
}

impl<E: QueryExecutor> SyncOrchestrator<E> {
    /// Build on any executor; `database` and `host` only label reports
    pub fn with_executor(executor: E, database: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            executor,
            database: database.into(),
            host: host.into(),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Available data balance in GB, from the first schema variant that
    /// has one. Zero when none does.
    #[instrument(skip(self), fields(database = %self.database))]
    pub async fn get_balance(&mut self) -> Decimal {
        let candidates = cascade::balance_candidates(self.executor.dialect());
        let outcome: CascadeOutcome = cascade::first_usable(&mut self.executor, candidates).await;

        if let Some(source) = outcome.source {
            info!(query_label = source, "data balance resolved");
        } else {
            for failure in &outcome.failures {
                error!(
                    query_label = failure.label,
                    cause = %failure.cause,
                    "balance candidate failed"
                );
            }
        }

        outcome.into_result().unwrap_or_else(|e| {
            warn!("{}; reporting zero balance", e);
            Decimal::ZERO
        })
    }

    /// Per-customer usage over the last `days` days, heaviest first
    #[instrument(skip(self), fields(database = %self.database))]
    pub async fn get_usage(&mut self, days: u32) -> Vec<CustomerUsage> {
        let dialect = self.executor.dialect();
        let query = format!(
            "SELECT customer_id, customer_name, \
             SUM(data_used_gb) AS total_used_gb, \
             AVG(data_used_gb) AS avg_daily_usage_gb, \
             COUNT(*) AS usage_days \
             FROM customer_usage \
             WHERE usage_date >= {} \
             GROUP BY customer_id, customer_name \
             ORDER BY total_used_gb DESC",
            dialect.days_ago(1)
        );

        match self.executor.execute(&query, &[SqlValue::from(days)]).await {
            Ok(rows) => map_rows(&rows, "customer usage", CustomerUsage::from_row),
            Err(e) => {
                error!("Failed to get customer usage: {}", e);
                Vec::new()
            }
        }
    }

    /// Active and suspended customers, newest registrations first
    #[instrument(skip(self), fields(database = %self.database))]
    pub async fn sync_customers(&mut self) -> Vec<CanonicalCustomer> {
        let query = self.executor.dialect().select_top(
            CUSTOMER_SYNC_LIMIT,
            "id AS external_id, name, email, phone, address, account_number, \
             registration_date, data_balance_gb, account_status \
             FROM customers \
             WHERE account_status IN ('active', 'suspended') \
             ORDER BY registration_date DESC",
        );

        match self.executor.execute(&query, &[]).await {
            Ok(rows) => {
                let customers = map_rows(&rows, "customer", CanonicalCustomer::from_row);
                info!(count = customers.len(), "customers synced");
                customers
            }
            Err(e) => {
                error!("Failed to sync customers: {}", e);
                Vec::new()
            }
        }
    }

    /// Purchases, allocations and adjustments dated from `from` through
    /// `to`.
    ///
    /// Both bounds bind as dates. Against a timestamp column `to` compares
    /// as midnight, so rows later on that day are not included.
    #[instrument(skip(self), fields(database = %self.database))]
    pub async fn import_transactions(&mut self, from: NaiveDate, to: NaiveDate) -> Vec<CanonicalTransaction> {
        let dialect = self.executor.dialect();
        let types = TransactionType::ALL
            .iter()
            .map(|t| format!("'{}'", t.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT transaction_id, transaction_date, customer_id, customer_name, \
             transaction_type, amount_gb, reference_number, description \
             FROM data_transactions \
             WHERE transaction_date BETWEEN {} AND {} \
             AND transaction_type IN ({}) \
             ORDER BY transaction_date DESC",
            dialect.placeholder(1),
            dialect.placeholder(2),
            types
        );

        match self
            .executor
            .execute(&query, &[SqlValue::from(from), SqlValue::from(to)])
            .await
        {
            Ok(rows) => {
                let transactions = map_rows(&rows, "transaction", CanonicalTransaction::from_row);
                info!(count = transactions.len(), "transactions imported");
                transactions
            }
            Err(e) => {
                error!("Failed to import transactions: {}", e);
                Vec::new()
            }
        }
    }

    /// Run a query without letting it change anything and render the
    /// whole result as CSV: a header row, then one line per row.
    ///
    /// The statement runs through [`QueryExecutor::read_only`], so a write
    /// hidden inside a SELECT (a data-modifying CTE, `SELECT ... INTO`)
    /// fails or is rolled back.
    ///
    /// # Errors
    /// - `DbError::NotReadOnly` unless the query starts with SELECT or WITH
    /// - any execution or serialization error
    #[instrument(skip(self, query), fields(database = %self.database))]
    pub async fn export(&mut self, query: &str, filename: &str) -> Result<TabularExport> {
        let statement = read_only_statement(query)?;
        let result = self.executor.read_only(statement).await.inspect_err(|e| {
            error!("Failed to export to CSV: {}", e);
        })?;

        Ok(TabularExport {
            filename: filename.to_string(),
            content: to_csv(&result)?,
            row_count: result.rows.len(),
        })
    }

    /// [`export`](Self::export) straight to a file; returns the row count
    pub async fn export_to_path(&mut self, query: &str, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let export = self.export(query, &filename).await?;
        tokio::fs::write(path, export.content.as_bytes()).await?;
        info!(rows = export.row_count, path = %path.display(), "export written");
        Ok(export.row_count)
    }

    /// Connect and report engine version and table count.
    ///
    /// # Errors
    /// - any connection or query failure
    #[instrument(skip(self), fields(database = %self.database, host = %self.host))]
    pub async fn test(&mut self) -> Result<ConnectionReport> {
        let dialect = self.executor.dialect();

        let version_rows = self.executor.execute(dialect.version_query(), &[]).await?;
        let version = version_rows
            .first()
            .and_then(|row| row.text("version"))
            .unwrap_or_else(|| "Unknown".to_string());

        let count_rows = self.executor.execute(dialect.table_count_query(), &[]).await?;
        let table_count = count_rows
            .first()
            .and_then(|row| row.non_null("table_count"))
            .and_then(SqlValue::as_i64)
            .unwrap_or(0);

        Ok(ConnectionReport {
            success: true,
            version,
            table_count,
            database: self.database.clone(),
            host: self.host.clone(),
        })
    }

    /// Schema of `table`
    pub async fn introspect(&mut self, table: &str) -> Result<TableInfo> {
        self.executor.introspect(table).await
    }
}

/// Map every row, skipping (and logging) rows that do not fit the model
fn map_rows<T>(rows: &[Row], what: &str, map: impl Fn(&Row) -> Result<T>) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match map(row) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping {} row: {}", what, e);
                None
            }
        })
        .collect()
}

/// The statement without trailing semicolons if it opens with SELECT or
/// WITH. Only a first filter: the read-only transaction is what keeps
/// writes out.
fn read_only_statement(query: &str) -> Result<&str> {
    let statement = query.trim().trim_end_matches(';').trim_end();
    let keyword: String = statement
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    if keyword.eq_ignore_ascii_case("select") || keyword.eq_ignore_ascii_case("with") {
        Ok(statement)
    } else {
        Err(DbError::NotReadOnly)
    }
}

/// Header from the result's columns, then one record per row
fn to_csv(result: &ResultSet) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if !result.columns.is_empty() {
        writer
            .write_record(&result.columns)
            .map_err(|e| DbError::Export(e.to_string()))?;
    }
    for row in &result.rows {
        writer
            .write_record(row.values().map(SqlValue::to_csv_field))
            .map_err(|e| DbError::Export(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| DbError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| DbError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_statement() {
        assert_eq!(read_only_statement("  SELECT 1; ").unwrap(), "SELECT 1");
        assert!(read_only_statement("with x as (select 1) select * from x").is_ok());
        assert!(matches!(
            read_only_statement("DELETE FROM customers"),
            Err(DbError::NotReadOnly)
        ));
        assert!(read_only_statement("selection").is_err());
        assert!(read_only_statement("INSERT INTO t SELECT 1").is_err());
    }

    #[test]
    fn test_semicolon_inside_literal_is_accepted() {
        assert_eq!(read_only_statement("SELECT 'a;b' AS s").unwrap(), "SELECT 'a;b' AS s");
    }

    #[test]
    fn test_csv_quoting() {
        let rows = vec![
            Row::new().with("id", 1i64).with("name", "Otieno, James").with("note", SqlValue::Null),
            Row::new().with("id", 2i64).with("name", "Said \"Sam\"").with("note", "ok"),
        ];

        let csv = to_csv(&ResultSet::from_rows(rows)).unwrap();
        assert_eq!(
            csv,
            "id,name,note\n1,\"Otieno, James\",\n2,\"Said \"\"Sam\"\"\",ok\n"
        );
    }

    #[test]
    fn test_csv_empty_result_keeps_header() {
        let empty = ResultSet::new(vec!["id".to_string(), "name".to_string()], Vec::new());
        assert_eq!(to_csv(&empty).unwrap(), "id,name\n");
    }
}
