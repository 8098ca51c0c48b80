// Consistent exit codes for the clipnote CLI.
//
//   0  = success
//   1  = general error
//   2  = rejected input (empty content, nothing to save)
//   10 = note store or model not configured
//   13 = upstream request failed

use std::process;

use clipnote_common::error::CaptureError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    NotConfigured = 10,
    Upstream = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(capture) = cause.downcast_ref::<CaptureError>() {
                return Self::from_capture_error(capture);
            }
            if let Some(failed) = cause.downcast_ref::<CommandFailed>() {
                return failed.exit_code;
            }
        }
        Self::Error
    }

    pub fn from_capture_error(error: &CaptureError) -> Self {
        match error {
            CaptureError::ConfigurationMissing(_) => Self::NotConfigured,
            CaptureError::TransportFailure { .. } | CaptureError::ResponseFormatError(_) => {
                Self::Upstream
            }
            CaptureError::ValidationError(_) => Self::Usage,
        }
    }

    /// Classify a failure that only survived as its display string, as
    /// outcomes and drafts carry them.
    pub fn from_message(message: &str) -> Self {
        if message.starts_with("request failed") {
            Self::Upstream
        } else if message.starts_with("Please configure") {
            Self::NotConfigured
        } else if message == CaptureError::empty_content().to_string() {
            Self::Usage
        } else {
            Self::Error
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

/// A command failure already reported to the user, carried in the
/// `anyhow::Error` chain so `main` can pick the exit code.
#[derive(Debug)]
pub struct CommandFailed {
    pub exit_code: ExitCode,
    pub message: String,
}

impl CommandFailed {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self { exit_code: ExitCode::from_message(&message), message }
    }
}

impl std::fmt::Display for CommandFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandFailed {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Error.code(), 1);
        assert_eq!(ExitCode::Usage.code(), 2);
        assert_eq!(ExitCode::NotConfigured.code(), 10);
        assert_eq!(ExitCode::Upstream.code(), 13);
    }

    #[test]
    fn capture_errors_in_chain() {
        let err = anyhow::Error::new(CaptureError::missing_note_store()).context("save failed");
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotConfigured);

        let err = anyhow::Error::new(CaptureError::transport(Some(502), "Bad Gateway"));
        assert_eq!(ExitCode::from_error(&err), ExitCode::Upstream);

        let err = anyhow::Error::new(CaptureError::empty_content());
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }

    #[test]
    fn command_failed_classifies_its_message() {
        let err = anyhow::Error::new(CommandFailed::new("request failed: 429 Rate limit reached"));
        assert_eq!(ExitCode::from_error(&err), ExitCode::Upstream);

        let err = anyhow::Error::new(CommandFailed::new(
            CaptureError::missing_model().to_string(),
        ));
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotConfigured);

        let err = anyhow::Error::new(CommandFailed::new("Content cannot be empty"));
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }

    #[test]
    fn from_error_generic_is_error() {
        let err = anyhow::anyhow!("something went wrong");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Error);
    }
}
