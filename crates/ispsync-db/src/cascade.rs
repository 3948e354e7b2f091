//! Fallback cascades over schema variants
//!
//! ISP billing databases disagree on where a figure lives. A cascade is an
//! ordered list of candidate queries; candidates run one at a time until one
//! yields a usable value. Later candidates are never executed once an
//! earlier one succeeds.

use crate::{
    connector::QueryExecutor,
    dialect::Dialect,
    error::DbError,
    value::{Row, SqlValue},
};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// A pure query descriptor: nothing runs until the cascade reaches it
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    pub label: &'static str,
    pub sql: String,
    pub params: Vec<SqlValue>,
    /// Column holding the value of interest
    pub column: &'static str,
}

impl CandidateQuery {
    pub fn new(label: &'static str, sql: impl Into<String>, column: &'static str) -> Self {
        Self {
            label,
            sql: sql.into(),
            params: Vec::new(),
            column,
        }
    }

    /// First row's `column` as a decimal, if present and non-null
    fn extract(&self, rows: &[Row]) -> Option<Decimal> {
        rows.first().and_then(|row| row.decimal(self.column))
    }
}

/// Why a candidate did not produce a value
#[derive(Debug)]
pub struct CandidateFailure {
    pub label: &'static str,
    pub cause: String,
}

/// Outcome of running a cascade
#[derive(Debug)]
pub struct CascadeOutcome {
    /// Value from the first usable candidate
    pub value: Option<Decimal>,
    /// Label of the candidate that produced `value`
    pub source: Option<&'static str>,
    /// Every candidate that was tried and failed, in order
    pub failures: Vec<CandidateFailure>,
}

impl CascadeOutcome {
    /// The value, or `CascadeExhausted` when every candidate failed
    pub fn into_result(self) -> Result<Decimal, DbError> {
        match self.value {
            Some(value) => Ok(value),
            None => Err(DbError::CascadeExhausted {
                attempts: self.failures.len(),
            }),
        }
    }
}

/// Evaluate `candidates` in order until one yields a non-null value.
///
/// Query failures and null results are recorded and the next candidate is
/// tried; nothing is propagated.
pub async fn first_usable<E, I>(executor: &mut E, candidates: I) -> CascadeOutcome
where
    E: QueryExecutor + ?Sized,
    I: IntoIterator<Item = CandidateQuery>,
{
    let mut failures = Vec::new();

    for candidate in candidates {
        let cause = match executor.execute(&candidate.sql, &candidate.params).await {
            Ok(rows) => match candidate.extract(&rows) {
                Some(value) => {
                    debug!(query_label = candidate.label, %value, "cascade candidate matched");
                    return CascadeOutcome {
                        value: Some(value),
                        source: Some(candidate.label),
                        failures,
                    };
                }
                None => format!("no usable '{}' value", candidate.column),
            },
            Err(e) => e.to_string(),
        };

        warn!(query_label = candidate.label, %cause, "cascade candidate failed");
        failures.push(CandidateFailure {
            label: candidate.label,
            cause,
        });
    }

    CascadeOutcome {
        value: None,
        source: None,
        failures,
    }
}

/// Known layouts for the ISP's available data balance, most specific first
pub fn balance_candidates(dialect: &dyn Dialect) -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::new(
            "data_balances",
            format!(
                "SELECT SUM(available_balance_gb) AS total_balance \
                 FROM data_balances \
                 WHERE status = 'active' AND expiry_date > {}",
                dialect.now()
            ),
            "total_balance",
        ),
        CandidateQuery::new(
            "customer_accounts",
            "SELECT SUM(data_balance) AS total_balance \
             FROM customer_accounts \
             WHERE account_status = 'active' AND data_balance > 0",
            "total_balance",
        ),
        CandidateQuery::new(
            "data_inventory",
            format!(
                "SELECT SUM(quantity * data_per_unit_gb) AS total_balance \
                 FROM data_inventory \
                 WHERE status = 'available' AND reserved = {}",
                dialect.false_literal()
            ),
            "total_balance",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqlServerDialect};

    #[test]
    fn test_balance_candidates_order() {
        let labels: Vec<_> = balance_candidates(&PostgresDialect)
            .iter()
            .map(|c| c.label)
            .collect();
        assert_eq!(labels, vec!["data_balances", "customer_accounts", "data_inventory"]);
    }

    #[test]
    fn test_balance_candidates_follow_dialect() {
        let candidates = balance_candidates(&SqlServerDialect);
        assert!(candidates[0].sql.contains("GETDATE()"));
        assert!(candidates[2].sql.ends_with("reserved = 0"));

        let candidates = balance_candidates(&PostgresDialect);
        assert!(candidates[0].sql.contains("NOW()"));
        assert!(candidates[2].sql.ends_with("reserved = FALSE"));
    }

    #[test]
    fn test_exhausted_outcome_reports_attempts() {
        let outcome = CascadeOutcome {
            value: None,
            source: None,
            failures: vec![
                CandidateFailure { label: "a", cause: "x".into() },
                CandidateFailure { label: "b", cause: "y".into() },
            ],
        };
        assert!(matches!(
            outcome.into_result(),
            Err(DbError::CascadeExhausted { attempts: 2 })
        ));
    }
}
