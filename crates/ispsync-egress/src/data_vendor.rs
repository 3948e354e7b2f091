//! Third-party data marketplace connector

use crate::{
    EgressError, Result,
    adapter::{DataPackage, ProviderAdapter, PurchaseOrder, PurchaseReceipt, correlation_id, request_timestamp},
    client::ProviderClient,
    envelope::{Envelope, Outcome},
    registry::ProviderKind,
};
use async_trait::async_trait;
use ispsync_core::decimal::decimal_from_json;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{error, instrument, warn};

/// Data marketplace API
pub struct DataVendorProvider {
    client: ProviderClient,
}

impl DataVendorProvider {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    async fn fetch_packages(&self) -> Result<Outcome<Vec<DataPackage>>> {
        let env = Envelope::parse(
            self.client
                .request_idempotent(Method::GET, "api/packages")
                .await?,
        )?;

        if !env.is_success() {
            return Ok(Outcome::failure(env.failure_message("Package catalog unavailable")));
        }

        let packages = env
            .array("packages")?
            .iter()
            .map(parse_package)
            .collect::<Result<Vec<_>>>()?;
        Ok(Outcome::Success(packages))
    }

    async fn buy_package(&self, package_id: &str, quantity: u32) -> Result<Outcome<PurchaseReceipt>> {
        let body = json!({
            "package_id": package_id,
            "quantity": quantity,
            "reference": correlation_id("TP"),
            "timestamp": request_timestamp(),
        });
        let env = Envelope::parse(
            self.client
                .request(Method::POST, "api/purchase", Some(&body))
                .await?,
        )?;

        if !env.is_success() {
            return Ok(Outcome::failure(env.failure_message("Purchase failed")));
        }

        let voucher_codes = match env.data.get("voucher_codes") {
            Some(Value::Array(codes)) => codes
                .iter()
                .filter_map(|c| match c {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(Outcome::Success(PurchaseReceipt {
            transaction_id: env.identifier("transaction_id")?,
            amount_gb: env.decimal("total_data_gb")?,
            cost: env.data.get("total_price").and_then(decimal_from_json),
            expiry_date: None,
            voucher_codes,
        }))
    }
}

fn parse_package(raw: &Value) -> Result<DataPackage> {
    let text = |key: &str| -> Result<String> {
        match raw.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(EgressError::Protocol(format!("package is missing '{}'", key))),
        }
    };
    let number = |key: &str| {
        raw.get(key)
            .and_then(decimal_from_json)
            .ok_or_else(|| EgressError::Protocol(format!("package '{}' is not a number", key)))
    };

    Ok(DataPackage {
        id: text("id")?,
        name: text("name")?,
        data_gb: number("data_gb")?,
        price: number("price")?,
        validity_days: raw
            .get("validity_days")
            .and_then(Value::as_u64)
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(|| EgressError::Protocol("package 'validity_days' is invalid".to_string()))?,
        description: raw
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[async_trait]
impl ProviderAdapter for DataVendorProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DataVendor
    }

    fn client(&self) -> &ProviderClient {
        &self.client
    }

    #[instrument(skip(self))]
    async fn packages(&self) -> Outcome<Vec<DataPackage>> {
        self.fetch_packages().await.unwrap_or_else(|e| {
            error!("Failed to get packages: {}", e);
            Outcome::failure(e.to_string())
        })
    }

    #[instrument(skip(self, order))]
    async fn purchase(&self, order: PurchaseOrder) -> Outcome<PurchaseReceipt> {
        let PurchaseOrder::Package {
            package_id,
            quantity,
        } = order
        else {
            return Outcome::failure("data vendors sell packages, not raw volume");
        };

        if quantity == 0 {
            warn!(%package_id, "refusing zero-quantity package purchase");
            return Outcome::failure("quantity must be at least 1");
        }

        self.buy_package(&package_id, quantity)
            .await
            .unwrap_or_else(|e| {
                error!("Failed to purchase package: {}", e);
                Outcome::failure(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_parse_package() {
        let raw = json!({
            "id": 17,
            "name": "Weekly 10GB",
            "data_gb": "10",
            "price": 499.99,
            "validity_days": 7
        });

        let pkg = parse_package(&raw).unwrap();
        assert_eq!(pkg.id, "17");
        assert_eq!(pkg.data_gb, Decimal::new(10, 0));
        assert_eq!(pkg.price, Decimal::new(49999, 2));
        assert_eq!(pkg.validity_days, 7);
        assert_eq!(pkg.description, "");
    }

    #[test]
    fn test_parse_package_missing_price() {
        let raw = json!({"id": "a", "name": "b", "data_gb": 1, "validity_days": 1});
        assert!(matches!(parse_package(&raw), Err(EgressError::Protocol(_))));
    }
}
