//! Relational database integration for ISP back-office systems
//!
//! This crate connects to an ISP's own billing database, whichever of the
//! supported engines it runs on, and pulls balances, usage, customers and
//! transactions out of it in a canonical shape.
//!
//! # Features
//! - PostgreSQL and MySQL through sqlx, SQL Server through tiberius
//! - One [`RelationalConnector`] surface for all three engines
//! - Per-engine SQL differences isolated behind [`dialect::Dialect`]
//! - Balance discovery by fallback cascade over known schema variants
//! - CSV export of read-only queries
//!
//! # Example
//! ```no_run
//! # use ispsync_db::{DatabaseConfig, DatabaseEngine, SyncOrchestrator};
//! # async fn example() -> ispsync_db::Result<()> {
//! let config = DatabaseConfig::new(DatabaseEngine::Postgresql, "db.isp.local", "billing")
//!     .with_credentials("sync", "secret");
//! let mut orchestrator = SyncOrchestrator::new(config);
//! let balance = orchestrator.get_balance().await;
//! # Ok(())
//! # }
//! ```

pub mod cascade;
pub mod config;
pub mod connector;
pub mod dialect;
pub mod engine;
mod error;
pub mod models;
pub mod orchestrator;
pub mod value;

pub use config::{DatabaseConfig, DatabaseEngine};
pub use connector::{ColumnInfo, ConnectorState, QueryExecutor, RelationalConnector, TableInfo};
pub use error::{DbError, Result};
pub use models::{CanonicalCustomer, CanonicalTransaction, CustomerStatus, CustomerUsage, TransactionType};
pub use orchestrator::{ConnectionReport, SyncOrchestrator, TabularExport};
pub use value::{ResultSet, Row, SqlValue};
