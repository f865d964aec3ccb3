use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::{AttributeFqn, Datatype};

// ---------------------------------------------------------------------------
// StatusCode — XACML status codes carried by Indeterminate results
// ---------------------------------------------------------------------------

/// Status code attached to an Indeterminate decision or evaluation fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusCode {
    Ok,
    MissingAttribute,
    SyntaxError,
    ProcessingError,
}

impl StatusCode {
    pub fn uri(self) -> &'static str {
        match self {
            StatusCode::Ok => "urn:oasis:names:tc:xacml:1.0:status:ok",
            StatusCode::MissingAttribute => "urn:oasis:names:tc:xacml:1.0:status:missing-attribute",
            StatusCode::SyntaxError => "urn:oasis:names:tc:xacml:1.0:status:syntax-error",
            StatusCode::ProcessingError => "urn:oasis:names:tc:xacml:1.0:status:processing-error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Ok => write!(f, "ok"),
            StatusCode::MissingAttribute => write!(f, "missing-attribute"),
            StatusCode::SyntaxError => write!(f, "syntax-error"),
            StatusCode::ProcessingError => write!(f, "processing-error"),
        }
    }
}

// ---------------------------------------------------------------------------
// IndeterminateError — runtime evaluation fault
// ---------------------------------------------------------------------------

/// Identifies the attribute whose absence caused a missing-attribute status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingAttributeDetail {
    pub attribute: AttributeFqn,
    pub datatype: Datatype,
}

/// Fault raised while evaluating an expression, target or condition.
///
/// Every runtime failure is one of these: it is converted into an
/// Indeterminate decision at the nearest Rule/Policy/PolicySet boundary and
/// never escapes a `Decidable::evaluate` call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct IndeterminateError {
    pub code: StatusCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_attribute: Option<MissingAttributeDetail>,
}

impl IndeterminateError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            missing_attribute: None,
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(StatusCode::ProcessingError, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SyntaxError, message)
    }

    /// Missing-attribute fault naming the attribute that could not be found.
    pub fn missing_attribute(attribute: &AttributeFqn, datatype: Datatype) -> Self {
        Self {
            code: StatusCode::MissingAttribute,
            message: format!("missing attribute {} of type {}", attribute, datatype),
            missing_attribute: Some(MissingAttributeDetail {
                attribute: attribute.clone(),
                datatype,
            }),
        }
    }

    /// Prefix the message with additional context, keeping the status code.
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{}: {}", context, self.message);
        self
    }
}

// ---------------------------------------------------------------------------
// ValueError — literal parsing and bag construction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("invalid {datatype} literal '{lexical}': {reason}")]
    InvalidLiteral {
        datatype: Datatype,
        lexical: String,
        reason: String,
    },

    #[error("unknown datatype '{0}'")]
    UnknownDatatype(String),

    #[error("bag of {expected} cannot hold a {actual} value")]
    BagTypeMismatch { expected: Datatype, actual: Datatype },
}

impl ValueError {
    pub(crate) fn invalid(datatype: Datatype, lexical: &str, reason: impl Into<String>) -> Self {
        ValueError::InvalidLiteral {
            datatype,
            lexical: lexical.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ValueError> for IndeterminateError {
    fn from(e: ValueError) -> Self {
        IndeterminateError::syntax(e.to_string())
    }
}

pub type ValueResult<T> = Result<T, ValueError>;
