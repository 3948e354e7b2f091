//! Telecom operator connector (Safaricom, Airtel, MTN)

use crate::{
    Result,
    adapter::{PurchaseOrder, PurchaseReceipt, ProviderAdapter, correlation_id, request_timestamp},
    client::ProviderClient,
    envelope::{Envelope, Outcome},
    registry::ProviderKind,
};
use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::{error, info, instrument};

/// Telecom provider API
pub struct TelecomProvider {
    kind: ProviderKind,
    client: ProviderClient,
}

impl TelecomProvider {
    pub fn new(kind: ProviderKind, client: ProviderClient) -> Self {
        Self { kind, client }
    }

    async fn fetch_balance(&self) -> Result<Outcome<Decimal>> {
        let body = json!({
            "timestamp": request_timestamp(),
            "request_id": correlation_id("bal"),
        });
        let env = Envelope::parse(
            self.client
                .request(Method::POST, "api/v1/data/balance", Some(&body))
                .await?,
        )?;

        if !env.is_success() {
            return Ok(Outcome::failure(env.failure_message("Unknown API error")));
        }
        Ok(Outcome::Success(env.decimal("available_data_gb")?))
    }

    async fn buy_volume(&self, amount_gb: Decimal, reference: &str) -> Result<Outcome<PurchaseReceipt>> {
        let body = json!({
            "amount_gb": amount_gb.to_string(),
            "reference": reference,
            "timestamp": request_timestamp(),
            "request_id": correlation_id("buy"),
        });
        let env = Envelope::parse(
            self.client
                .request(Method::POST, "api/v1/data/purchase", Some(&body))
                .await?,
        )?;

        if !env.is_success() {
            return Ok(Outcome::failure(env.failure_message("Purchase failed")));
        }

        Ok(Outcome::Success(PurchaseReceipt {
            transaction_id: env.identifier("transaction_id")?,
            amount_gb: env.decimal("amount_gb")?,
            cost: Some(env.decimal("cost")?),
            expiry_date: env
                .data
                .get("expiry_date")
                .and_then(Value::as_str)
                .map(str::to_string),
            voucher_codes: Vec::new(),
        }))
    }

    async fn fetch_history(&self, days: u32) -> Result<Outcome<Vec<Value>>> {
        let env = Envelope::parse(
            self.client
                .request_idempotent(Method::GET, &format!("api/v1/data/history?days={}", days))
                .await?,
        )?;

        if !env.is_success() {
            return Ok(Outcome::failure(env.failure_message("History unavailable")));
        }
        Ok(Outcome::Success(env.array("transactions")?))
    }
}

#[async_trait]
impl ProviderAdapter for TelecomProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn client(&self) -> &ProviderClient {
        &self.client
    }

    #[instrument(skip(self), fields(provider = %self.kind))]
    async fn balance(&self) -> Outcome<Decimal> {
        match self.fetch_balance().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to get telecom data balance: {}", e);
                Outcome::failure(e.to_string())
            }
        }
    }

    #[instrument(skip(self, order), fields(provider = %self.kind))]
    async fn purchase(&self, order: PurchaseOrder) -> Outcome<PurchaseReceipt> {
        let PurchaseOrder::Volume {
            amount_gb,
            reference,
        } = order
        else {
            return Outcome::failure(format!("{} providers sell data by volume, not by package", self.kind));
        };

        match self.buy_volume(amount_gb, &reference).await {
            Ok(outcome) => {
                if let Outcome::Success(receipt) = &outcome {
                    info!(
                        transaction_id = %receipt.transaction_id,
                        amount_gb = %receipt.amount_gb,
                        "data purchased"
                    );
                }
                outcome
            }
            Err(e) => {
                error!("Failed to purchase data: {}", e);
                Outcome::failure(e.to_string())
            }
        }
    }

    #[instrument(skip(self), fields(provider = %self.kind))]
    async fn purchase_history(&self, days: u32) -> Outcome<Vec<Value>> {
        match self.fetch_history(days).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to get history: {}", e);
                Outcome::failure(e.to_string())
            }
        }
    }
}
