// `clipnote cancel`: discard the staged capture.

use clap::Args;
use serde::Serialize;

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct CancelArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResult {
    /// Revision of the draft that was discarded, if one was staged.
    pub discarded: Option<u64>,
}

pub fn run(args: CancelArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = session.run(|runtime| async move {
        let review = runtime.review()?;
        let discarded = review.refresh()?.draft().map(|draft| draft.revision);
        review.cancel().await?;
        review.close();
        Ok(CancelResult { discarded })
    });
    super::report(format, result, format_human).map(|_| ())
}

fn format_human(result: &CancelResult) -> String {
    match result.discarded {
        Some(revision) => format!("Discarded capture (revision {revision})."),
        None => "Nothing to discard.".to_string(),
    }
}
