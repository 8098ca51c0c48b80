// `clipnote save`: save the staged capture, optionally with edited text.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use clipnote_common::error::CaptureError;

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct SaveArgs {
    /// Replacement text for the staged summary.
    #[arg(long, group = "content_source")]
    text: Option<String>,

    /// Read replacement text from a file.
    #[arg(group = "content_source")]
    file: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: SaveArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let edited = match (&args.text, &args.file) {
        (Some(text), _) => Some(text.clone()),
        (_, Some(path)) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read `{}`", path.display()))?,
        ),
        (None, None) => None,
    };

    let outcome = session.run(|runtime| async move {
        let review = runtime.review()?;
        // Without an edit the staged text is saved as it is.
        let text = match edited {
            Some(text) => text,
            None => review
                .refresh()?
                .draft()
                .and_then(|draft| draft.summary.clone())
                .ok_or_else(|| CaptureError::ValidationError("No finished capture to save".into()))?,
        };
        let outcome = review.save(&text).await;
        review.close();
        Ok(outcome)
    });
    super::report_outcome(format, outcome)
}
