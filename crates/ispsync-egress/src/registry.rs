//! Provider registry
//!
//! Resolves a provider kind to its adapter and batch-tests configured
//! connections.

use crate::{
    EgressError, Result,
    adapter::ProviderAdapter,
    client::{HttpClientConfig, ProviderClient},
    config::{ConnectionTestResult, ProviderConnection},
    data_vendor::DataVendorProvider,
    isp_system::IspSystemProvider,
    telecom::TelecomProvider,
};
use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use tracing::{error, info};

/// Closed catalog of supported provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Safaricom,
    Airtel,
    Mtn,
    IspSystem,
    DataVendor,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Safaricom,
        ProviderKind::Airtel,
        ProviderKind::Mtn,
        ProviderKind::IspSystem,
        ProviderKind::DataVendor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Safaricom => "safaricom",
            ProviderKind::Airtel => "airtel",
            ProviderKind::Mtn => "mtn",
            ProviderKind::IspSystem => "isp_system",
            ProviderKind::DataVendor => "data_vendor",
        }
    }

    pub fn is_telecom(&self) -> bool {
        matches!(
            self,
            ProviderKind::Safaricom | ProviderKind::Airtel | ProviderKind::Mtn
        )
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = EgressError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "safaricom" => Ok(ProviderKind::Safaricom),
            "airtel" => Ok(ProviderKind::Airtel),
            "mtn" => Ok(ProviderKind::Mtn),
            "isp_system" => Ok(ProviderKind::IspSystem),
            "data_vendor" => Ok(ProviderKind::DataVendor),
            other => Err(EgressError::UnknownProviderKind(other.to_string())),
        }
    }
}

/// Endpoint and credentials an adapter is built from
#[derive(Debug, Clone, Default)]
pub struct ConnectionParams {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl ConnectionParams {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_secret(mut self, api_secret: impl Into<String>) -> Self {
        self.api_secret = Some(api_secret.into());
        self
    }
}

impl From<&ProviderConnection> for ConnectionParams {
    fn from(conn: &ProviderConnection) -> Self {
        Self {
            endpoint: conn.endpoint.clone(),
            api_key: conn.api_key.clone(),
            api_secret: conn.api_secret.clone(),
        }
    }
}

/// Builds adapters for provider kinds
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    client_config: HttpClientConfig,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_config(client_config: HttpClientConfig) -> Self {
        Self { client_config }
    }

    /// Build the adapter for `kind`.
    ///
    /// # Errors
    /// - `EgressError::Config` if the endpoint is invalid
    pub fn build(&self, kind: ProviderKind, params: ConnectionParams) -> Result<Box<dyn ProviderAdapter>> {
        let client = ProviderClient::new(
            params.endpoint,
            params.api_key,
            params.api_secret,
            self.client_config.clone(),
        )?;

        let adapter: Box<dyn ProviderAdapter> = match kind {
            ProviderKind::Safaricom | ProviderKind::Airtel | ProviderKind::Mtn => {
                Box::new(TelecomProvider::new(kind, client))
            }
            ProviderKind::IspSystem => Box::new(IspSystemProvider::new(client)),
            ProviderKind::DataVendor => Box::new(DataVendorProvider::new(client)),
        };
        Ok(adapter)
    }

    /// Resolve a provider-kind identifier and build its adapter.
    ///
    /// # Errors
    /// - `EgressError::UnknownProviderKind` for identifiers outside the catalog
    /// - `EgressError::Config` if the endpoint is invalid
    pub fn get(&self, kind: &str, params: ConnectionParams) -> Result<Box<dyn ProviderAdapter>> {
        let kind = kind.parse::<ProviderKind>()?;
        self.build(kind, params)
    }

    /// Test every connection independently and concurrently.
    ///
    /// A connection whose adapter cannot be built, whose probe fails, or
    /// whose probe panics is reported `false`; the others are unaffected.
    pub async fn batch_test(&self, connections: &[ProviderConnection]) -> BTreeMap<String, bool> {
        let checks = connections.iter().map(|conn| async move {
            let ok = match AssertUnwindSafe(self.test_one(conn)).catch_unwind().await {
                Ok(ok) => ok,
                Err(_) => {
                    error!("Connection test panicked for {}", conn.name);
                    false
                }
            };
            (conn.name.clone(), ok)
        });

        let results: BTreeMap<String, bool> = join_all(checks).await.into_iter().collect();
        let passed = results.values().filter(|ok| **ok).count();
        info!(passed, total = results.len(), "provider connection sweep finished");
        results
    }

    /// [`batch_test`](Self::batch_test), also stamping each connection's
    /// last test result.
    pub async fn batch_test_and_record(
        &self,
        connections: &mut [ProviderConnection],
    ) -> BTreeMap<String, bool> {
        let results = self.batch_test(connections).await;
        let tested_at = chrono::Utc::now();
        for conn in connections.iter_mut() {
            if let Some(ok) = results.get(&conn.name) {
                conn.last_test = Some(ConnectionTestResult { ok: *ok, tested_at });
            }
        }
        results
    }

    async fn test_one(&self, conn: &ProviderConnection) -> bool {
        match self.build(conn.provider_kind, conn.into()) {
            Ok(adapter) => adapter.test_connection().await,
            Err(e) => {
                error!("Connection test failed for {}: {}", conn.name, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_names() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kinds_rejected() {
        for name in ["vodafone", "", "Safaricom", "isp-system", "data vendor"] {
            match name.parse::<ProviderKind>() {
                Err(EgressError::UnknownProviderKind(got)) => assert_eq!(got, name),
                other => panic!("expected UnknownProviderKind for {:?}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_get_builds_matching_adapter() {
        let registry = ProviderRegistry::new();
        for kind in ProviderKind::ALL {
            let adapter = registry
                .get(kind.as_str(), ConnectionParams::new("https://provider.example.com"))
                .unwrap();
            assert_eq!(adapter.kind(), kind);
        }
    }

    #[test]
    fn test_get_unknown_kind() {
        let registry = ProviderRegistry::new();
        let result = registry.get("telkom", ConnectionParams::new("https://provider.example.com"));
        assert!(matches!(result, Err(EgressError::UnknownProviderKind(_))));
    }

    #[test]
    fn test_telecom_kinds() {
        assert!(ProviderKind::Mtn.is_telecom());
        assert!(!ProviderKind::IspSystem.is_telecom());
        assert!(!ProviderKind::DataVendor.is_telecom());
    }
}
