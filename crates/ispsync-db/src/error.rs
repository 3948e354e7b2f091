use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the relational connector and sync orchestrator
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Database operation timed out after {0}s")]
    Timeout(u64),

    /// The surrounding transaction has already been rolled back
    #[error("Query execution failed: {source}")]
    QueryExecution { query: String, source: BoxError },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Only read-only SELECT/WITH queries can be exported")]
    NotReadOnly,

    #[error("Cannot decode column '{column}': {message}")]
    Decode { column: String, message: String },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("All {attempts} candidate queries failed")]
    CascadeExhausted { attempts: usize },
}

impl DbError {
    pub(crate) fn query(query: &str, source: impl Into<BoxError>) -> Self {
        DbError::QueryExecution {
            query: query.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn decode(column: &str, message: impl Into<String>) -> Self {
        DbError::Decode {
            column: column.to_string(),
            message: message.into(),
        }
    }

    /// True when the session itself is unusable and must be reopened
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, DbError::Connection(_) | DbError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<DbError> for ispsync_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Connection(msg) => ispsync_core::Error::Connection(msg),
            DbError::Timeout(secs) => ispsync_core::Error::Timeout(secs),
            DbError::QueryExecution { query, source } => ispsync_core::Error::QueryExecution {
                message: query,
                source: Some(source),
            },
            DbError::CascadeExhausted { attempts } => {
                ispsync_core::Error::CascadeExhausted { attempts }
            }
            DbError::Io(e) => ispsync_core::Error::Io(e),
            other => ispsync_core::Error::QueryExecution {
                message: other.to_string(),
                source: None,
            },
        }
    }
}
