// `clipnote review`: show the staged capture.

use clap::Args;
use clipnote_daemon::review::ReviewView;
use serde::Serialize;

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct ReviewArgs {
    /// Wait for an in-flight capture to finish.
    #[arg(long)]
    wait: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

/// The staged draft as a command prints it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DraftReport {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    pub is_extract_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Page a review surface would open on (`common` or `quicknote`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opens_on: Option<&'static str>,
}

impl DraftReport {
    pub fn from_view(view: &ReviewView) -> Self {
        let draft = view.draft();
        Self {
            state: view.name(),
            revision: draft.map(|d| d.revision),
            is_extract_only: draft.is_some_and(|d| d.is_extract_only),
            title: draft.and_then(|d| d.title.clone()),
            url: draft.and_then(|d| d.url.clone()),
            summary: draft.and_then(|d| d.summary.clone()),
            error: draft.and_then(|d| d.error.clone()),
            opens_on: None,
        }
    }
}

pub fn run(args: ReviewArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let timeout = session.settle_timeout();
    let result = session.run(|runtime| async move {
        let review = runtime.review()?;
        let view = if args.wait { review.wait_until_settled(timeout).await? } else { review.refresh()? };
        let mut report = DraftReport::from_view(&view);
        report.opens_on = Some(review.default_tab(None)?.as_str());
        review.close();
        Ok(report)
    });
    super::report(format, result, format_human).map(|_| ())
}

pub fn format_human(report: &DraftReport) -> String {
    let mut lines = Vec::new();
    let kind = if report.is_extract_only { "extract" } else { "summary" };
    match report.revision {
        Some(revision) => lines.push(format!("{} ({kind}, revision {revision})", report.state)),
        None => lines.push("No capture staged.".to_string()),
    }
    if let Some(title) = &report.title {
        lines.push(format!("  Title: {title}"));
    }
    if let Some(url) = &report.url {
        lines.push(format!("  URL:   {url}"));
    }
    if let Some(error) = &report.error {
        lines.push(format!("  Error: {error}"));
    }
    if let Some(summary) = &report.summary {
        lines.push(String::new());
        lines.push(summary.clone());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use clipnote_common::types::{DraftStatus, WorkflowDraft};

    use super::*;

    fn draft(status: DraftStatus) -> WorkflowDraft {
        WorkflowDraft {
            status,
            summary: Some("Hi".into()),
            url: Some("https://x.com".into()),
            title: Some("X".into()),
            is_extract_only: false,
            timestamp: 0,
            revision: 4,
            error: None,
            lease_until: None,
        }
    }

    #[test]
    fn empty_view_reports_nothing_staged() {
        let report = DraftReport::from_view(&ReviewView::Empty);
        assert_eq!(report.state, "empty");
        assert_eq!(report.revision, None);
        assert_eq!(format_human(&report), "No capture staged.");
    }

    #[test]
    fn ready_view_shows_summary_and_source() {
        let report = DraftReport::from_view(&ReviewView::Ready(draft(DraftStatus::Ready)));
        let output = format_human(&report);
        assert!(output.starts_with("ready (summary, revision 4)"));
        assert!(output.contains("Title: X"));
        assert!(output.contains("https://x.com"));
        assert!(output.ends_with("\nHi"));
    }

    #[test]
    fn json_omits_absent_fields() {
        let report = DraftReport::from_view(&ReviewView::Empty);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "empty", "is_extract_only": false }));
    }
}
