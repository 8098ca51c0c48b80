// Source backlinks and tags appended to outbound note bodies.
//
// Supported forms:
// - Original link: [title](url)   (text notes)
// - > Source: [title](url)        (image notes)

use crate::settings::Settings;
use crate::types::NoteKind;

const PARAGRAPH_BREAK: &str = "\n\n";

/// The canonical backlink line for `kind`. The label falls back to the
/// URL when the title is missing or blank.
pub fn canonical_backlink(kind: NoteKind, url: &str, title: Option<&str>) -> String {
    let label = match title {
        Some(title) if !title.trim().is_empty() => title,
        _ => url,
    };
    match kind {
        NoteKind::Image => format!("> Source: [{label}]({url})"),
        _ => format!("Original link: [{label}]({url})"),
    }
}

/// Build the note body sent to the note store.
///
/// Appends the canonical backlink (when enabled for `kind` and not already
/// present) and the configured tag (when set and not already the trailing
/// paragraph). Running it again on its own output returns the input.
pub fn compose_note_body(
    content: &str,
    kind: NoteKind,
    url: Option<&str>,
    title: Option<&str>,
    settings: &Settings,
) -> String {
    let mut body = content.to_string();

    if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
        if settings.includes_url(kind) {
            let backlink = canonical_backlink(kind, url, title);
            if !body.contains(&backlink) {
                append_paragraph(&mut body, &backlink);
            }
        }
    }

    if let Some(tag) = settings.tag_for(kind) {
        if !ends_with_paragraph(&body, tag) {
            append_paragraph(&mut body, tag);
        }
    }

    body
}

/// Count occurrences of the canonical backlink in `body`.
pub fn count_backlinks(body: &str, kind: NoteKind, url: &str, title: Option<&str>) -> usize {
    body.matches(&canonical_backlink(kind, url, title)).count()
}

fn append_paragraph(body: &mut String, paragraph: &str) {
    if !body.is_empty() {
        body.push_str(PARAGRAPH_BREAK);
    }
    body.push_str(paragraph);
}

fn ends_with_paragraph(body: &str, paragraph: &str) -> bool {
    body == paragraph || body.ends_with(&format!("{PARAGRAPH_BREAK}{paragraph}"))
}
