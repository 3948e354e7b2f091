//! Provider response envelopes and uniform operation outcomes
//!
//! Providers wrap their payloads as `{status|success, message?, data}`.
//! Telecom operators say `"status": "success"`, ISP systems and
//! marketplaces say `"success": true`. [`Envelope`] accepts both.

use crate::{EgressError, Result};
use ispsync_core::decimal::decimal_from_json;
use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Parsed provider response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: Option<Value>,

    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub message: Option<Value>,

    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Parse a raw response body.
    ///
    /// # Errors
    /// - `EgressError::Protocol` if the body is not a JSON object
    pub fn parse(body: Value) -> Result<Self> {
        if !body.is_object() {
            return Err(EgressError::Protocol(format!(
                "expected a JSON object envelope, got {}",
                body
            )));
        }
        serde_json::from_value(body)
            .map_err(|e| EgressError::Protocol(format!("malformed envelope: {}", e)))
    }

    pub fn is_success(&self) -> bool {
        if self.success == Some(true) {
            return true;
        }
        match &self.status {
            Some(Value::String(s)) => s.eq_ignore_ascii_case("success"),
            Some(Value::Bool(b)) => *b,
            _ => false,
        }
    }

    /// Provider-supplied failure reason, or `default`
    pub fn failure_message(&self, default: &str) -> String {
        match &self.message {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::String(_)) | Some(Value::Null) | None => default.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Required field of `data`
    pub fn field(&self, key: &str) -> Result<&Value> {
        self.data
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| EgressError::Protocol(format!("missing data.{}", key)))
    }

    /// Required decimal field of `data`
    pub fn decimal(&self, key: &str) -> Result<Decimal> {
        let value = self.field(key)?;
        decimal_from_json(value)
            .ok_or_else(|| EgressError::Protocol(format!("data.{} is not a number: {}", key, value)))
    }

    /// Required identifier field of `data`, accepting numbers or strings
    pub fn identifier(&self, key: &str) -> Result<String> {
        match self.field(key)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(EgressError::Protocol(format!(
                "data.{} is not an identifier: {}",
                key, other
            ))),
        }
    }

    /// Required array field of `data`
    pub fn array(&self, key: &str) -> Result<Vec<Value>> {
        match self.field(key)? {
            Value::Array(items) => Ok(items.clone()),
            other => Err(EgressError::Protocol(format!(
                "data.{} is not a list: {}",
                key, other
            ))),
        }
    }
}

/// Uniform result of a provider role operation.
///
/// Serializes as `{"success": true, "data": ...}` or
/// `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(String),
}

impl<T> Outcome<T> {
    pub fn failure(reason: impl Into<String>) -> Self {
        Outcome::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Outcome::Success(data) => Some(data),
            Outcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(reason) => Some(reason),
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Outcome::Success(data) => Some(data),
            Outcome::Failure(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(data) => Outcome::Success(f(data)),
            Outcome::Failure(reason) => Outcome::Failure(reason),
        }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Outcome::Success(data),
            Err(e) => Outcome::Failure(e.to_string()),
        }
    }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Outcome", 2)?;
        match self {
            Outcome::Success(data) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
            }
            Outcome::Failure(reason) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", reason)?;
            }
        }
        state.end()
    }
}
