// Error taxonomy for capture and save workflows.

use thiserror::Error;

/// Failure causes surfaced to users. `Display` is the message shown in the
/// status line or system notification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// A required endpoint or credential is absent. Never retried.
    #[error("{0}")]
    ConfigurationMissing(String),

    /// Network failure or non-2xx response from a backend.
    #[error("{}", transport_message(.status, .message))]
    TransportFailure { status: Option<u16>, message: String },

    /// A backend answered with an unexpected shape.
    #[error("{0}")]
    ResponseFormatError(String),

    /// Rejected before any network call (empty content, missing tab).
    #[error("{0}")]
    ValidationError(String),
}

impl CaptureError {
    pub fn missing_note_store() -> Self {
        Self::ConfigurationMissing(
            "Please configure the note service API URL and authentication key first".into(),
        )
    }

    pub fn missing_model() -> Self {
        Self::ConfigurationMissing("Please configure the model API URL and API key first".into())
    }

    pub fn empty_content() -> Self {
        Self::ValidationError("Content cannot be empty".into())
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::TransportFailure { status, message: message.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing(_) => "CONFIGURATION_MISSING",
            Self::TransportFailure { .. } => "TRANSPORT_FAILURE",
            Self::ResponseFormatError(_) => "RESPONSE_FORMAT_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
        }
    }
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match *status {
        Some(code) if message.is_empty() => format!("request failed: {code}"),
        Some(code) => format!("request failed: {code} {message}"),
        None => format!("request failed: {message}"),
    }
}
