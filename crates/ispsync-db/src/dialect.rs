//! Per-engine SQL differences
//!
//! Queries issued by the orchestrator are written once against this trait;
//! each engine contributes its own placeholders, row limits, clock function,
//! boolean literal and catalog queries.

use crate::config::DatabaseEngine;

pub trait Dialect: Send + Sync {
    fn engine(&self) -> DatabaseEngine;

    /// Bind placeholder for the 1-based parameter `index`
    fn placeholder(&self, index: usize) -> String;

    /// `SELECT` with at most `limit` rows; `body` is everything after the
    /// `SELECT` keyword
    fn select_top(&self, limit: u32, body: &str) -> String {
        format!("SELECT {} LIMIT {}", body, limit)
    }

    /// Current timestamp expression
    fn now(&self) -> &'static str {
        "NOW()"
    }

    fn false_literal(&self) -> &'static str {
        "FALSE"
    }

    /// Timestamp `N` days ago, with `N` bound at parameter `index`
    fn days_ago(&self, index: usize) -> String;

    /// Query with a single `version` column
    fn version_query(&self) -> &'static str;

    /// Query with a single `table_count` column
    fn table_count_query(&self) -> &'static str;

    /// Columns of the table bound at parameter 1, as
    /// `column_name`, `data_type`, `is_nullable`
    fn columns_query(&self) -> String;
}

/// PostgreSQL
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Postgresql
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn days_ago(&self, index: usize) -> String {
        format!("NOW() - make_interval(days => {}::int)", self.placeholder(index))
    }

    fn version_query(&self) -> &'static str {
        "SELECT version() AS version"
    }

    fn table_count_query(&self) -> &'static str {
        "SELECT COUNT(*) AS table_count FROM information_schema.tables WHERE table_schema = 'public'"
    }

    fn columns_query(&self) -> String {
        format!(
            "SELECT column_name::text AS column_name, data_type::text AS data_type, \
             is_nullable::text AS is_nullable \
             FROM information_schema.columns \
             WHERE table_name = {} AND table_schema = current_schema() \
             ORDER BY ordinal_position",
            self.placeholder(1)
        )
    }
}

/// MySQL / MariaDB
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Mysql
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn days_ago(&self, index: usize) -> String {
        format!("NOW() - INTERVAL {} DAY", self.placeholder(index))
    }

    fn version_query(&self) -> &'static str {
        "SELECT @@version AS version"
    }

    fn table_count_query(&self) -> &'static str {
        "SELECT COUNT(*) AS table_count FROM information_schema.tables WHERE table_schema = DATABASE()"
    }

    fn columns_query(&self) -> String {
        format!(
            "SELECT column_name AS column_name, data_type AS data_type, \
             is_nullable AS is_nullable \
             FROM information_schema.columns \
             WHERE table_name = {} AND table_schema = DATABASE() \
             ORDER BY ordinal_position",
            self.placeholder(1)
        )
    }
}

/// Microsoft SQL Server
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Sqlserver
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn select_top(&self, limit: u32, body: &str) -> String {
        format!("SELECT TOP {} {}", limit, body)
    }

    fn now(&self) -> &'static str {
        "GETDATE()"
    }

    fn false_literal(&self) -> &'static str {
        "0"
    }

    fn days_ago(&self, index: usize) -> String {
        // DATEADD rejects a bigint increment
        format!("DATEADD(day, -CAST({} AS INT), GETDATE())", self.placeholder(index))
    }

    fn version_query(&self) -> &'static str {
        "SELECT @@VERSION AS version"
    }

    fn table_count_query(&self) -> &'static str {
        "SELECT COUNT(*) AS table_count FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE'"
    }

    fn columns_query(&self) -> String {
        format!(
            "SELECT COLUMN_NAME AS column_name, DATA_TYPE AS data_type, \
             IS_NULLABLE AS is_nullable \
             FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_NAME = {} \
             ORDER BY ORDINAL_POSITION",
            self.placeholder(1)
        )
    }
}
