// Output format auto-detection for the CLI.
//
// TTY → human-readable text. Piped/redirected → structured JSON.
// `--json` flag forces JSON output regardless of terminal.

use clipnote_common::error::CaptureError;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

use crate::exit_code::CommandFailed;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Human,
    /// Machine-readable JSON (one object per response).
    Json,
}

impl OutputFormat {
    /// Auto-detect format: JSON if `--json` was passed or stdout is not a TTY.
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    /// Testable variant that takes an explicit `is_tty` flag.
    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Write a value to stdout in the selected format.
pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    write_output(&mut io::stdout().lock(), format, value, human_fn)
}

/// Write a value to a provided writer (useful for testing).
pub fn write_output<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    human_fn: F,
) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Human => {
            writeln!(writer, "{}", human_fn(value))
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

/// Write an error to stderr in the selected format.
pub fn print_error(format: OutputFormat, code: &str, message: &str) {
    let mut err = io::stderr().lock();
    let _ = match format {
        OutputFormat::Human => writeln!(
            err,
            "{}",
            render_human_stderr_line("error", message, io::stderr().is_terminal(), ANSI_RED)
        ),
        OutputFormat::Json => writeln!(err, "{}", error_json(code, message)),
    };
}

fn error_json(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({ "error": { "code": code, "message": message } })
}

/// Print a mapped, actionable error for a command failure.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    let (code, message) = actionable_error(error);
    print_error(format, code, &message);
}

fn actionable_error(error: &anyhow::Error) -> (&'static str, String) {
    let message = format!("{error:#}");

    let capture = error.chain().find_map(|cause| cause.downcast_ref::<CaptureError>());
    if let Some(CaptureError::ConfigurationMissing(_)) = capture {
        return (
            "CONFIGURATION_MISSING",
            format!("{message}. Run: clipnote settings set <field> <value>"),
        );
    }
    if let Some(capture) = capture {
        return (capture.kind(), message);
    }

    if let Some(failed) = error.chain().find_map(|cause| cause.downcast_ref::<CommandFailed>()) {
        if failed.message.starts_with("Please configure") {
            return (
                "CONFIGURATION_MISSING",
                format!("{}. Run: clipnote settings set <field> <value>", failed.message),
            );
        }
        if failed.message.starts_with("request failed") {
            return ("TRANSPORT_FAILURE", failed.message.clone());
        }
        return ("COMMAND_FAILED", failed.message.clone());
    }

    if message.to_ascii_lowercase().contains("database is locked") {
        return (
            "STORE_BUSY",
            "The store is in use by another clipnote process. Try again shortly.".to_string(),
        );
    }

    ("ERROR", message)
}

fn render_human_stderr_line(label: &str, message: &str, is_tty: bool, color: &str) -> String {
    if is_tty {
        format!("{color}{label}:{ANSI_RESET} {message}")
    } else {
        format!("{label}: {message}")
    }
}
