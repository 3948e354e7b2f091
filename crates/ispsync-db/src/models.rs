//! Canonical records produced from ISP database rows

use crate::{Result, error::DbError, value::Row};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Inactive,
}

impl CustomerStatus {
    /// Source systems use many account states; only `active` stays active
    pub fn from_account_status(status: Option<&str>) -> Self {
        match status {
            Some(s) if s.trim().eq_ignore_ascii_case("active") => CustomerStatus::Active,
            _ => CustomerStatus::Inactive,
        }
    }
}

/// A customer as the platform models it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCustomer {
    pub external_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub account_number: Option<String>,
    pub data_balance: Decimal,
    pub status: CustomerStatus,
}

impl CanonicalCustomer {
    /// Map a row of the source `customers` projection
    ///
    /// # Errors
    /// - `DbError::Decode` when `external_id` is missing
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            external_id: required(row, "external_id")?,
            name: row.text("name").unwrap_or_default(),
            email: row.text("email"),
            phone: row.text("phone"),
            address: row.text("address"),
            account_number: row.text("account_number"),
            data_balance: row.decimal("data_balance_gb").unwrap_or(Decimal::ZERO),
            status: CustomerStatus::from_account_status(row.text("account_status").as_deref()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    Allocation,
    Adjustment,
}

impl TransactionType {
    pub const ALL: [TransactionType; 3] = [
        TransactionType::Purchase,
        TransactionType::Allocation,
        TransactionType::Adjustment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Allocation => "allocation",
            TransactionType::Adjustment => "adjustment",
        }
    }
}

impl FromStr for TransactionType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "purchase" => Ok(TransactionType::Purchase),
            "allocation" => Ok(TransactionType::Allocation),
            "adjustment" => Ok(TransactionType::Adjustment),
            other => Err(DbError::decode(
                "transaction_type",
                format!("unexpected transaction type '{}'", other),
            )),
        }
    }
}

/// A data transaction as the platform models it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTransaction {
    pub external_id: String,
    pub date: Option<NaiveDateTime>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount_gb: Decimal,
    pub reference: Option<String>,
    pub description: Option<String>,
}

impl CanonicalTransaction {
    /// Map a row of the source `data_transactions` projection
    ///
    /// # Errors
    /// - `DbError::Decode` when the id, type or amount is missing or invalid
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            external_id: required(row, "transaction_id")?,
            date: row.non_null("transaction_date").and_then(|v| v.as_datetime()),
            customer_id: row.text("customer_id"),
            customer_name: row.text("customer_name"),
            transaction_type: required(row, "transaction_type")?.parse()?,
            amount_gb: row
                .decimal("amount_gb")
                .ok_or_else(|| DbError::decode("amount_gb", "missing or not numeric"))?,
            reference: row.text("reference_number"),
            description: row.text("description"),
        })
    }
}

/// Aggregated usage of one customer over a rolling window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerUsage {
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub total_used_gb: Decimal,
    pub avg_daily_usage_gb: Decimal,
    pub usage_days: i64,
}

impl CustomerUsage {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            customer_id: required(row, "customer_id")?,
            customer_name: row.text("customer_name"),
            total_used_gb: row.decimal("total_used_gb").unwrap_or(Decimal::ZERO),
            avg_daily_usage_gb: row
                .decimal("avg_daily_usage_gb")
                .map(|d| d.round_dp(4))
                .unwrap_or(Decimal::ZERO),
            usage_days: row
                .non_null("usage_days")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        })
    }
}

fn required(row: &Row, column: &str) -> Result<String> {
    row.text(column)
        .ok_or_else(|| DbError::decode(column, "missing required value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SqlValue;
    use chrono::NaiveDate;

    #[test]
    fn test_customer_mapping_normalizes_status() {
        let row = Row::new()
            .with("external_id", 42i64)
            .with("name", "Achieng Otieno")
            .with("email", SqlValue::Null)
            .with("phone", "+254700000000")
            .with("address", "Kisumu")
            .with("account_number", "ACC-42")
            .with("registration_date", NaiveDate::from_ymd_opt(2025, 1, 5).unwrap())
            .with("data_balance_gb", Decimal::new(1575, 2))
            .with("account_status", "suspended");

        let customer = CanonicalCustomer::from_row(&row).unwrap();
        assert_eq!(customer.external_id, "42");
        assert_eq!(customer.email, None);
        assert_eq!(customer.data_balance, Decimal::new(1575, 2));
        assert_eq!(customer.status, CustomerStatus::Inactive);

        let active = Row::new().with("external_id", "7").with("account_status", "ACTIVE");
        let customer = CanonicalCustomer::from_row(&active).unwrap();
        assert_eq!(customer.status, CustomerStatus::Active);
        assert_eq!(customer.data_balance, Decimal::ZERO);
    }

    #[test]
    fn test_customer_without_id_is_rejected() {
        let row = Row::new().with("name", "Nobody");
        assert!(matches!(
            CanonicalCustomer::from_row(&row),
            Err(DbError::Decode { .. })
        ));
    }

    #[test]
    fn test_transaction_mapping() {
        let row = Row::new()
            .with("transaction_id", "TX-1")
            .with("transaction_date", NaiveDate::from_ymd_opt(2026, 9, 14).unwrap())
            .with("customer_id", 9i64)
            .with("customer_name", "Baraka")
            .with("transaction_type", "allocation")
            .with("amount_gb", "2.5")
            .with("reference_number", "REF-9")
            .with("description", SqlValue::Null);

        let tx = CanonicalTransaction::from_row(&row).unwrap();
        assert_eq!(tx.transaction_type, TransactionType::Allocation);
        assert_eq!(tx.amount_gb, Decimal::new(25, 1));
        assert_eq!(tx.customer_id.as_deref(), Some("9"));
        assert_eq!(
            tx.date.map(|d| d.date()),
            NaiveDate::from_ymd_opt(2026, 9, 14)
        );
        assert!(tx.description.is_none());

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "allocation");
    }

    #[test]
    fn test_transaction_with_unknown_type_is_rejected() {
        let row = Row::new()
            .with("transaction_id", "TX-2")
            .with("transaction_type", "refund")
            .with("amount_gb", 1i64);
        assert!(CanonicalTransaction::from_row(&row).is_err());
    }

    #[test]
    fn test_usage_mapping() {
        let row = Row::new()
            .with("customer_id", "C-1")
            .with("customer_name", "Kamau")
            .with("total_used_gb", Decimal::new(1205, 1))
            .with("avg_daily_usage_gb", Decimal::new(401666667, 8))
            .with("usage_days", 30i64);

        let usage = CustomerUsage::from_row(&row).unwrap();
        assert_eq!(usage.total_used_gb, Decimal::new(1205, 1));
        assert_eq!(usage.avg_daily_usage_gb, Decimal::new(40167, 4));
        assert_eq!(usage.usage_days, 30);
    }
}
