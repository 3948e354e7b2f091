//! ispsync Egress Connectors
//!
//! This crate wraps external provider HTTP APIs behind one adapter contract:
//! - Telecom operators (Safaricom, Airtel, MTN)
//! - ISP back-office management systems
//! - Third-party data marketplaces
//!
//! The [`registry::ProviderRegistry`] resolves a provider kind to its adapter
//! and batch-tests configured connections.

pub mod adapter;
pub mod client;
pub mod config;
pub mod data_vendor;
pub mod envelope;
pub mod isp_system;
pub mod registry;
pub mod telecom;

pub use adapter::{DataPackage, ProviderAdapter, PurchaseOrder, PurchaseReceipt, UsageSummary};
pub use config::{ConnectionTestResult, ProviderConnection};
pub use envelope::Outcome;
pub use registry::{ConnectionParams, ProviderKind, ProviderRegistry};

use thiserror::Error;

/// Errors raised while talking to a provider API
#[derive(Debug, Error)]
pub enum EgressError {
    #[error("Request timeout after {0}s")]
    Timeout(u64),

    #[error("Cannot connect to API: {0}")]
    Connection(String),

    #[error("API returned error: {status_code}")]
    HttpStatus { status_code: u16, message: String },

    #[error("Unexpected API response: {0}")]
    Protocol(String),

    #[error("Unknown provider type: {0}")]
    UnknownProviderKind(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EgressError>;

impl From<EgressError> for ispsync_core::Error {
    fn from(err: EgressError) -> Self {
        match err {
            EgressError::Timeout(secs) => ispsync_core::Error::Timeout(secs),
            EgressError::Connection(msg) => ispsync_core::Error::Connection(msg),
            EgressError::HttpStatus {
                status_code,
                message,
            } => ispsync_core::Error::HttpStatus {
                status_code,
                message,
            },
            EgressError::Protocol(msg) => ispsync_core::Error::Protocol(msg),
            EgressError::UnknownProviderKind(kind) => {
                ispsync_core::Error::UnknownProviderKind(kind)
            }
            EgressError::Config(msg) => ispsync_core::Error::Config(msg),
        }
    }
}
