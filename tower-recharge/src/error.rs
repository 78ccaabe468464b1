use std::collections::BTreeMap;
use std::fmt;

use tower::BoxError;

use crate::classify::Response;

/// The outcome of one dispatched request.
pub type ClassifiedResult = std::result::Result<Response, RechargeError>;

pub type Result<T, E = RechargeError> = std::result::Result<T, E>;

/// Errors produced by the Recharge client.
///
/// Nothing here is retried automatically. Every error is delivered to the
/// caller that submitted the request, and the dispatcher moves on to the next
/// queued request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RechargeError {
    /// The admission queue already holds `max_depth` requests.
    ///
    /// Raised synchronously at submission; the request was never queued.
    #[error("Admission queue is full ({max_depth} pending); request rejected")]
    QueueOverflow { max_depth: usize },

    /// The API rejected the payload, keyed by field.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// The API returned a non-validation failure (auth, not-found, server error).
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The call never produced a usable response: connection failure, timeout
    /// or an undecodable body.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request's cancellation token fired before it was dispatched.
    #[error("Request cancelled before dispatch")]
    Cancelled,

    /// The dispatcher went away before resolving the request.
    #[error("Dispatcher closed before the request resolved")]
    Closed,

    /// The request could not be encoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The client configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RechargeError {
    /// Maps a transport-layer failure, including a tower timeout.
    pub(crate) fn from_transport(err: BoxError) -> Self {
        if err.is::<tower::timeout::error::Elapsed>() {
            Self::Transport("request timed out".to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }

    /// Whether a caller may reasonably resubmit the same request later.
    ///
    /// Validation failures need new input, so they are never retryable.
    pub fn is_retryable_by_caller(&self) -> bool {
        match self {
            Self::QueueOverflow { .. } | Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Validation(_)
            | Self::Cancelled
            | Self::Closed
            | Self::InvalidRequest(_)
            | Self::Config(_) => false,
        }
    }
}

impl From<recharge_limit::Cancelled> for RechargeError {
    fn from(_: recharge_limit::Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Field-keyed validation messages returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new(fields: BTreeMap<String, Vec<String>>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// `field: msg1,msg2` per field, fields separated by `"; "`.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, messages)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, messages.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_joins_fields() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "title".to_string(),
            vec!["is required".to_string(), "is too short".to_string()],
        );
        fields.insert("type".to_string(), vec!["is invalid".to_string()]);
        let errors = ValidationErrors::new(fields);

        assert_eq!(
            errors.message(),
            "title: is required,is too short; type: is invalid"
        );
        assert_eq!(
            RechargeError::Validation(errors.clone()).to_string(),
            errors.message()
        );
        assert_eq!(errors.get("type"), Some(&["is invalid".to_string()][..]));
    }

    #[test]
    fn timeouts_map_to_transport_errors() {
        let err = RechargeError::from_transport(Box::new(tower::timeout::error::Elapsed::new()));
        assert_eq!(err, RechargeError::Transport("request timed out".to_string()));
        assert!(err.is_retryable_by_caller());
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        let validation = RechargeError::Validation(ValidationErrors::default());
        assert!(!validation.is_retryable_by_caller());
        assert!(
            RechargeError::Api {
                status: 503,
                message: "unavailable".to_string()
            }
            .is_retryable_by_caller()
        );
        assert!(
            !RechargeError::Api {
                status: 404,
                message: "not found".to_string()
            }
            .is_retryable_by_caller()
        );
        assert!(RechargeError::QueueOverflow { max_depth: 1 }.is_retryable_by_caller());
    }
}
