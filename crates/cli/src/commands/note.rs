// `clipnote note`: show, extend, send or clear the quick note.

use clap::{Args, Subcommand};
use clipnote_common::types::{Attachment, TabInfo};
use serde::Serialize;

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct NoteArgs {
    #[command(subcommand)]
    action: NoteAction,

    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum NoteAction {
    /// Print the quick note and its attachments
    Show,
    /// Append text, separated from existing text by a blank line
    Add { text: String },
    /// Send the quick note as one note and clear it
    Send {
        /// Page URL to attribute the note to.
        #[arg(long)]
        url: Option<String>,
        /// Page title to attribute the note to.
        #[arg(long)]
        title: Option<String>,
    },
    /// Drop the text and every attachment
    Clear,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteReport {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

pub fn run(args: NoteArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match args.action {
        NoteAction::Send { url, title } => {
            let tab = (url.is_some() || title.is_some()).then(|| TabInfo {
                id: 0,
                url: url.unwrap_or_default(),
                title: title.unwrap_or_default(),
            });
            let outcome = session.run(|runtime| async move {
                let review = runtime.review()?;
                let outcome = review.send_quick_note(tab.as_ref()).await;
                review.close();
                Ok(outcome)
            });
            super::report_outcome(format, outcome)
        }
        action => {
            let result = session.run(|runtime| async move {
                let review = runtime.review()?;
                let note = review.quick_note();
                match action {
                    NoteAction::Add { text } => {
                        note.append_text(&text)?;
                    }
                    NoteAction::Clear => note.clear()?,
                    NoteAction::Show | NoteAction::Send { .. } => {}
                }
                // Previews are not needed here, so the batch is read as stored.
                let report = NoteReport { text: note.text()?, attachments: note.ledger().batch()? };
                review.close();
                Ok(report)
            });
            super::report(format, result, format_human).map(|_| ())
        }
    }
}

fn format_human(report: &NoteReport) -> String {
    if report.text.trim().is_empty() && report.attachments.is_empty() {
        return "Quick note is empty.".to_string();
    }
    let mut lines = vec![report.text.clone()];
    if !report.attachments.is_empty() {
        lines.push(String::new());
        lines.push(format!("Attachments ({}):", report.attachments.len()));
        for attachment in &report.attachments {
            let source = attachment.original_url.as_deref().unwrap_or(&attachment.remote_path);
            lines.push(format!("  {} ({})", attachment.name, source));
        }
    }
    lines.join("\n")
}
