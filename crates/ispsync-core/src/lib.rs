//! ispsync Core Types
//!
//! This crate provides the fundamental types shared by every ispsync crate:
//! - The error taxonomy for integrations, databases and the event bus
//! - Tenant, role and session identity types
//! - Arbitrary-precision decimal helpers for money and data volumes

pub mod decimal;
pub mod error;
pub mod tenant;

pub use error::{Error, Result};
pub use tenant::{Role, SessionIdentity, TenantId};
