//! Error types for ispsync Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Transport errors
    #[error("Request timeout after {0}s")]
    Timeout(u64),

    #[error("Connection error: {0}")]
    Connection(String),

    // Remote system errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("HTTP status {status_code}: {message}")]
    HttpStatus { status_code: u16, message: String },

    #[error("Unknown provider kind: {0}")]
    UnknownProviderKind(String),

    // Database errors
    #[error("Query execution failed (rolled back): {message}")]
    QueryExecution {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("All {attempts} fallback queries failed")]
    CascadeExhausted { attempts: usize },

    // Event bus errors
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    // Multi-tenancy errors
    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures that mean the remote system could not be reached
    /// at all, as opposed to a reachable system reporting a problem.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
