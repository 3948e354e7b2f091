//! ISP back-office management system connector

use crate::{
    Result,
    adapter::{ProviderAdapter, UsageSummary},
    client::ProviderClient,
    envelope::{Envelope, Outcome},
    registry::ProviderKind,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{error, instrument};

/// Integration with an ISP's own management system
pub struct IspSystemProvider {
    client: ProviderClient,
}

impl IspSystemProvider {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    async fn fetch_usage(&self, from: NaiveDate, to: NaiveDate) -> Result<Outcome<UsageSummary>> {
        let body = json!({
            "date_from": from.to_string(),
            "date_to": to.to_string(),
            "aggregate_by": "total",
        });
        let env = Envelope::parse(
            self.client
                .request(Method::POST, "api/data/usage", Some(&body))
                .await?,
        )?;

        if !env.is_success() {
            return Ok(Outcome::failure(env.failure_message("Usage data unavailable")));
        }

        let customer_count = env.field("customer_count")?.as_u64().ok_or_else(|| {
            crate::EgressError::Protocol("data.customer_count is not a count".to_string())
        })?;

        Ok(Outcome::Success(UsageSummary {
            total_usage_gb: env.decimal("total_usage_gb")?,
            customer_count,
            average_usage_gb: env.decimal("average_usage_gb")?,
        }))
    }

    async fn fetch_customers(&self) -> Result<Outcome<Vec<Value>>> {
        let env = Envelope::parse(
            self.client
                .request_idempotent(Method::GET, "api/customers/active")
                .await?,
        )?;

        if !env.is_success() {
            return Ok(Outcome::failure(env.failure_message("Customer list unavailable")));
        }
        Ok(Outcome::Success(env.array("customers")?))
    }
}

#[async_trait]
impl ProviderAdapter for IspSystemProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::IspSystem
    }

    fn client(&self) -> &ProviderClient {
        &self.client
    }

    #[instrument(skip(self))]
    async fn customers(&self) -> Outcome<Vec<Value>> {
        self.fetch_customers().await.unwrap_or_else(|e| {
            error!("Failed to sync customers: {}", e);
            Outcome::failure(e.to_string())
        })
    }

    #[instrument(skip(self))]
    async fn usage(&self, from: NaiveDate, to: NaiveDate) -> Outcome<UsageSummary> {
        self.fetch_usage(from, to).await.unwrap_or_else(|e| {
            error!("Failed to get usage data: {}", e);
            Outcome::failure(e.to_string())
        })
    }
}
