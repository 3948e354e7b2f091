//! Provider connection records
//!
//! Connections are owned by the external configuration store; this module
//! only defines their shape and resolves `$VAR` credential references.

use crate::registry::ProviderKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of the last connection test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub ok: bool,
    pub tested_at: DateTime<Utc>,
}

/// One configured provider connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConnection {
    /// Display name, unique per tenant
    pub name: String,

    /// Provider kind (must be in the registry catalog)
    #[serde(rename = "provider_type", alias = "provider_kind")]
    pub provider_kind: ProviderKind,

    /// Base URL of the provider API
    #[serde(alias = "api_endpoint")]
    pub endpoint: String,

    /// API key (supports env var syntax: $VAR_NAME or ${VAR_NAME})
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// API secret (supports env var syntax)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test: Option<ConnectionTestResult>,
}

impl ProviderConnection {
    pub fn new(name: impl Into<String>, provider_kind: ProviderKind, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider_kind,
            endpoint: endpoint.into(),
            api_key: None,
            api_secret: None,
            last_test: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Replace `$NAME` / `${NAME}` credential references with the named
    /// environment variable. Values without a reference stay as they are.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConnectionConfigError> {
        resolve_credential("api_key", &mut self.api_key)?;
        resolve_credential("api_secret", &mut self.api_secret)?;
        Ok(())
    }
}

fn resolve_credential(
    field: &'static str,
    value: &mut Option<String>,
) -> Result<(), ConnectionConfigError> {
    let Some(var_name) = value.as_deref().and_then(env_reference) else {
        return Ok(());
    };
    let resolved = std::env::var(var_name).map_err(|_| ConnectionConfigError::EnvVarNotFound {
        field,
        var_name: var_name.to_string(),
    })?;
    *value = Some(resolved);
    Ok(())
}

/// Variable named by a `$NAME` or `${NAME}` reference. An unterminated
/// brace or an empty name is not a reference.
fn env_reference(value: &str) -> Option<&str> {
    let name = value.trim().strip_prefix('$')?;
    let name = match name.strip_prefix('{') {
        Some(braced) => braced.strip_suffix('}')?,
        None => name,
    };
    (!name.is_empty()).then_some(name)
}

#[derive(Debug, Error)]
pub enum ConnectionConfigError {
    #[error("{field} references unset environment variable {var_name}")]
    EnvVarNotFound {
        field: &'static str,
        var_name: String,
    },
}
