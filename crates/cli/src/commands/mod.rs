// CLI subcommand dispatch.

use clap::Subcommand;
use clipnote_common::types::SaveOutcome;
use serde::Serialize;

use crate::exit_code::CommandFailed;
use crate::output::{self, OutputFormat};
use crate::session::Session;

pub mod cancel;
pub mod capture;
pub mod note;
pub mod review;
pub mod save;
pub mod settings;

#[derive(Subcommand)]
pub enum Command {
    /// Summarize or extract text and stage it for review
    Capture(capture::CaptureArgs),
    /// Show the staged capture
    Review(review::ReviewArgs),
    /// Save the staged capture, optionally with edited text
    Save(save::SaveArgs),
    /// Discard the staged capture
    Cancel(cancel::CancelArgs),
    /// Work with the quick note
    Note(note::NoteArgs),
    /// Show or change settings
    Settings(settings::SettingsArgs),
}

pub fn run(cmd: Command, session: &Session) -> anyhow::Result<()> {
    match cmd {
        Command::Capture(args) => capture::run(args, session),
        Command::Review(args) => review::run(args, session),
        Command::Save(args) => save::run(args, session),
        Command::Cancel(args) => cancel::run(args, session),
        Command::Note(args) => note::run(args, session),
        Command::Settings(args) => settings::run(args, session),
    }
}

/// Print `result`, or the error that prevented one.
fn report<T, F>(format: OutputFormat, result: anyhow::Result<T>, human_fn: F) -> anyhow::Result<T>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match result {
        Ok(value) => {
            output::print_output(format, &value, human_fn)?;
            Ok(value)
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

/// Print a save outcome; a failed one becomes the command's error.
fn report_outcome(format: OutputFormat, outcome: anyhow::Result<SaveOutcome>) -> anyhow::Result<()> {
    let outcome = report(format, outcome, format_outcome)?;
    match outcome.error {
        None => Ok(()),
        Some(error) => Err(CommandFailed::new(error).into()),
    }
}

fn format_outcome(outcome: &SaveOutcome) -> String {
    match &outcome.error {
        None => "Saved.".to_string(),
        Some(error) => format!("Save failed: {error}"),
    }
}
