use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ClassifiedResult;
use crate::error::RechargeError;
use crate::error::ValidationErrors;

const UNRECOGNIZED: &str = "unrecognized error";

/// A successful API response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A decoded body from a 2xx response.
    Payload(Value),
    /// A no-content response; the body was never read.
    Status(u16),
}

impl Response {
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Payload(value) => Some(value),
            Self::Status(_) => None,
        }
    }

    pub fn into_payload(self) -> Option<Value> {
        match self {
            Self::Payload(value) => Some(value),
            Self::Status(_) => None,
        }
    }

    /// The bare status of a no-content response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Payload(_) => None,
        }
    }
}

/// Maps a status code and decoded body to a result.
///
/// Failures carrying an `errors` object become [`RechargeError::Validation`];
/// a single `error` (or `errors`) string becomes [`RechargeError::Api`].
pub fn classify(status: u16, body: Value) -> ClassifiedResult {
    if (200..300).contains(&status) {
        return Ok(Response::Payload(body));
    }

    if let Some(Value::Object(errors)) = body.get("errors")
        && !errors.is_empty()
    {
        let fields: BTreeMap<String, Vec<String>> = errors
            .iter()
            .map(|(field, messages)| (field.clone(), messages_of(messages)))
            .collect();
        return Err(RechargeError::Validation(ValidationErrors::new(fields)));
    }

    let message = ["error", "errors"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .unwrap_or(UNRECOGNIZED);
    Err(RechargeError::Api {
        status,
        message: message.to_string(),
    })
}

fn messages_of(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        other => vec![other.to_string()],
    }
}
