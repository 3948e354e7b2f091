//! Provider adapter trait definitions

use crate::{Result, client::ProviderClient, envelope::Outcome, registry::ProviderKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to buy from a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseOrder {
    /// Raw data volume from a telecom operator
    Volume { amount_gb: Decimal, reference: String },

    /// Catalog package from a data marketplace
    Package { package_id: String, quantity: u32 },
}

/// Confirmed purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub transaction_id: String,
    pub amount_gb: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voucher_codes: Vec<String>,
}

/// Marketplace catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPackage {
    pub id: String,
    pub name: String,
    pub data_gb: Decimal,
    pub price: Decimal,
    pub validity_days: u32,
    #[serde(default)]
    pub description: String,
}

/// Aggregated usage over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_usage_gb: Decimal,
    pub customer_count: u64,
    pub average_usage_gb: Decimal,
}

/// Uniform contract over one external provider API.
///
/// `request` and `test_connection` are shared by every adapter. The role
/// operations default to a failure outcome; each adapter overrides the ones
/// its provider actually offers.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Kind this adapter was built for
    fn kind(&self) -> ProviderKind;

    /// Underlying HTTP client
    fn client(&self) -> &ProviderClient;

    /// Send a raw request and return the parsed JSON body
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        self.client().request(method, path, body.as_ref()).await
    }

    /// Probe the provider. Never fails.
    async fn test_connection(&self) -> bool {
        self.client().test_connection().await
    }

    /// Available data balance held with the provider, in GB
    async fn balance(&self) -> Outcome<Decimal> {
        unsupported(self.kind(), "balance query")
    }

    /// Buy data. Sent exactly once; callers decide whether to retry.
    async fn purchase(&self, _order: PurchaseOrder) -> Outcome<PurchaseReceipt> {
        unsupported(self.kind(), "purchase")
    }

    /// Raw purchase history for the last `days` days
    async fn purchase_history(&self, _days: u32) -> Outcome<Vec<Value>> {
        unsupported(self.kind(), "purchase history")
    }

    /// Package catalog
    async fn packages(&self) -> Outcome<Vec<DataPackage>> {
        unsupported(self.kind(), "package catalog")
    }

    /// Active customer list
    async fn customers(&self) -> Outcome<Vec<Value>> {
        unsupported(self.kind(), "customer list")
    }

    /// Usage aggregate between two dates (inclusive)
    async fn usage(&self, _from: NaiveDate, _to: NaiveDate) -> Outcome<UsageSummary> {
        unsupported(self.kind(), "usage summary")
    }
}

fn unsupported<T>(kind: ProviderKind, operation: &str) -> Outcome<T> {
    Outcome::failure(format!("{} is not supported by {} providers", operation, kind))
}

/// Correlation id for mutating requests, e.g. `bal_6f1c...`
pub(crate) fn correlation_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// RFC 3339 timestamp stamped on mutating requests
pub(crate) fn request_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_shape() {
        let id = correlation_id("bal");
        assert!(id.starts_with("bal_"));
        assert_eq!(id.len(), "bal_".len() + 32);
        assert_ne!(id, correlation_id("bal"));
    }

    #[test]
    fn test_purchase_order_serde() {
        let order = PurchaseOrder::Package {
            package_id: "PKG-10".to_string(),
            quantity: 2,
        };
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["kind"], "package");
        assert_eq!(json["quantity"], 2);
    }
}
