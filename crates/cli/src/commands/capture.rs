// `clipnote capture`: summarize or extract text and stage it for review.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use clipnote_common::error::CaptureError;
use clipnote_common::protocol::messages::CaptureRequest;

use super::review::{format_human, DraftReport};
use crate::exit_code::CommandFailed;
use crate::output::{self, OutputFormat};
use crate::session::Session;

#[derive(Debug, Args)]
pub struct CaptureArgs {
    /// File to read; `-` or nothing reads stdin.
    pub file: Option<PathBuf>,

    /// Keep the text as-is instead of summarizing it.
    #[arg(long)]
    extract: bool,

    /// Source page URL for the backlink.
    #[arg(long)]
    url: Option<String>,

    /// Source page title for the backlink.
    #[arg(long)]
    title: Option<String>,

    /// Save straight to the note store without staging a draft.
    #[arg(long)]
    direct: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: CaptureArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let content = match read_content(args.file.as_ref()) {
        Ok(content) => content,
        Err(e) => {
            output::print_anyhow_error(format, &e);
            return Err(e);
        }
    };
    let request = CaptureRequest {
        content,
        url: args.url,
        title: args.title,
        is_extract_only: args.extract,
        direct_save: args.direct,
    };

    if args.direct {
        let outcome = session.run(|runtime| async move {
            Ok(runtime.router().coordinator().direct_save(&request).await)
        });
        return super::report_outcome(format, outcome);
    }

    let timeout = session.settle_timeout();
    let result = session.run(|runtime| async move {
        let review = runtime.review()?;
        let reply = review.request_capture(request).await;
        if reply.is_unknown() {
            anyhow::bail!("no response from background");
        }
        let view = review.wait_until_settled(timeout).await?;
        review.close();
        Ok(view)
    });

    let view = super::report(format, result.map(|view| DraftReport::from_view(&view)), format_human)?;
    match (view.state, view.error) {
        ("ready", _) => Ok(()),
        (_, Some(error)) => Err(CommandFailed::new(error).into()),
        (state, None) => Err(CommandFailed::new(format!("capture did not finish ({state})")).into()),
    }
}

/// Read the capture text, rejecting blank input before anything starts.
fn read_content(file: Option<&PathBuf>) -> anyhow::Result<String> {
    let content = match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("failed to read stdin")?;
            buf
        }
    };
    if content.trim().is_empty() {
        return Err(CaptureError::empty_content().into());
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::exit_code::ExitCode;

    #[test]
    fn reads_content_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("page.txt");
        std::fs::write(&path, "Hello world").unwrap();
        assert_eq!(read_content(Some(&path)).unwrap(), "Hello world");
    }

    #[test]
    fn blank_file_is_rejected_as_usage_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blank.txt");
        std::fs::write(&path, " \n\t").unwrap();
        let err = read_content(Some(&path)).unwrap_err();
        assert_eq!(err.to_string(), "Content cannot be empty");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }

    #[test]
    fn missing_file_names_the_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.txt");
        let err = read_content(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }
}
