//! Normalized failure values for backend operations.
//!
//! Every failed operation ends up as an [`ApiFailure`], whatever went wrong on
//! the way: a structured rejection from the backend, a body of some other
//! shape, or no usable response at all.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shown when no error value has been recorded.
pub const UNKNOWN_ERROR_TEXT: &str = "An unknown error occurred.";
/// Shown for any failure that carries no structured detail.
pub const GENERIC_FAILURE_TEXT: &str = "Submission failed. Please check the data.";

/// One entry of a validation rejection: `{"loc": [_, field], "msg": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub loc: Vec<Value>,
    pub msg: String,
}

impl FieldError {
    /// The rejected field: the second `loc` element (the first names the
    /// request part, e.g. `"body"`).
    #[must_use]
    pub fn field_name(&self) -> String {
        match self.loc.get(1).or_else(|| self.loc.last()) {
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
            None => "request".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ApiFailure {
    /// `{"detail": "..."}`
    Detail(String),
    /// `{"detail": [{"loc": [...], "msg": "..."}, ...]}`
    Validation(Vec<FieldError>),
    /// A JSON error body of any other shape.
    Unrecognized(Value),
    /// Success status, but the body did not match the expected payload.
    MalformedResponse(String),
    /// No usable response: connection failure, timeout, or a non-JSON body.
    Transport(String),
}

impl ApiFailure {
    /// Classify a JSON error body.
    #[must_use]
    pub fn from_body(body: Value) -> Self {
        match body.get("detail") {
            Some(Value::String(detail)) => Self::Detail(detail.clone()),
            Some(Value::Array(items)) => {
                let parsed: Result<Vec<FieldError>, _> = items
                    .iter()
                    .map(|item| serde_json::from_value(item.clone()))
                    .collect();
                match parsed {
                    Ok(errors) => Self::Validation(errors),
                    Err(_) => Self::Unrecognized(body),
                }
            }
            _ => Self::Unrecognized(body),
        }
    }

    /// User-facing text for this failure.
    ///
    /// Structured details are shown verbatim; validation errors render as
    /// `"{field}: {msg}"` joined by `"; "`; everything else collapses to
    /// [`GENERIC_FAILURE_TEXT`].
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Detail(detail) => detail.clone(),
            Self::Validation(errors) => errors
                .iter()
                .map(|err| format!("{}: {}", err.field_name(), err.msg))
                .collect::<Vec<_>>()
                .join("; "),
            Self::Unrecognized(_) | Self::MalformedResponse(_) | Self::Transport(_) => {
                GENERIC_FAILURE_TEXT.to_string()
            }
        }
    }

    /// Text for logs; keeps the underlying cause that `display_message` hides.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Detail(_) | Self::Validation(_) => self.display_message(),
            Self::Unrecognized(body) => format!("unrecognized error body: {body}"),
            Self::MalformedResponse(reason) => format!("malformed response: {reason}"),
            Self::Transport(reason) => format!("transport failure: {reason}"),
        }
    }
}

/// Render an optional failure the way the form's error line does.
#[must_use]
pub fn format_failure(failure: Option<&ApiFailure>) -> String {
    failure.map_or_else(|| UNKNOWN_ERROR_TEXT.to_string(), ApiFailure::display_message)
}
