// User settings record stored under the `settings` key (sync area).

use serde::{Deserialize, Serialize};

use crate::types::NoteKind;

pub const DEFAULT_MODEL_NAME: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.5;
pub const CONTENT_PLACEHOLDER: &str = "{content}";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Please write a clear and concise summary based on the provided webpage content, highlighting the key points without missing any important details.

Requirements:
1. **Summary Structure:**
    *   The first line should be in the format '# Title', giving a brief main title.
    *   A one-sentence summary: Provide a concise and precise statement summarizing the core content of the entire webpage.
    *   Summarize the key points of each major section in the order they appear in the webpage.

2. **Highlight Key Points:** Please identify and emphasize the critical information, themes, key arguments, and conclusions in the webpage. If the content contains important data or conclusions, make sure to include them in the summary.
3. **Cover All Important Aspects:** Ensure that all significant aspects of the webpage are covered, avoiding omission of any key information.

Please note:
*   The summary should be objective and neutral, avoiding personal opinions or emotional tones.
*   The language of the summary should be simple and clear, avoiding overly technical or obscure terms, and the summary should be in English.
*   The length of the summary should be moderate, covering the important content while avoiding being overly long or verbose.
*   Do not provide a concluding statement at the end of the summary, but instead, include a single sentence summarizing it.
Here is the webpage content: {content}";

/// Immutable-per-session configuration. Reads always return a full
/// snapshot; writes replace the whole record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Note store base URL, e.g. `https://notes.example.com/api/v1`.
    pub target_url: String,
    pub auth_key: String,
    /// OpenAI-compatible model endpoint.
    pub model_url: String,
    pub api_key: String,
    pub model_name: String,
    pub temperature: f64,
    pub prompt_template: String,
    pub include_summary_url: bool,
    pub include_selection_url: bool,
    pub include_image_url: bool,
    pub include_quick_note_url: bool,
    pub summary_tag: String,
    pub selection_tag: String,
    pub image_tag: String,
    pub extract_tag: String,
    pub enable_floating_ball: bool,
    pub jina_api_key: String,
    pub use_jina_api_key: bool,
    pub save_web_images: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            auth_key: String::new(),
            model_url: String::new(),
            api_key: String::new(),
            model_name: DEFAULT_MODEL_NAME.into(),
            temperature: DEFAULT_TEMPERATURE,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.into(),
            include_summary_url: true,
            include_selection_url: true,
            include_image_url: true,
            include_quick_note_url: false,
            summary_tag: "#Web/Summary".into(),
            selection_tag: "#Web/Excerpt".into(),
            image_tag: "#Web/Image".into(),
            extract_tag: "#Web/Clip".into(),
            enable_floating_ball: true,
            jina_api_key: String::new(),
            use_jina_api_key: false,
            save_web_images: false,
        }
    }
}

impl Settings {
    /// Fill the fields that must never be blank. Tags are left as the user
    /// set them: an empty tag means "no tag".
    pub fn normalized(mut self) -> Self {
        if self.model_name.trim().is_empty() {
            self.model_name = DEFAULT_MODEL_NAME.into();
        }
        if self.temperature <= 0.0 || !self.temperature.is_finite() {
            self.temperature = DEFAULT_TEMPERATURE;
        }
        if self.prompt_template.trim().is_empty() {
            self.prompt_template = DEFAULT_PROMPT_TEMPLATE.into();
        }
        self.target_url = self.target_url.trim().to_string();
        self.auth_key = self.auth_key.trim().to_string();
        self.model_url = self.model_url.trim().to_string();
        self.api_key = self.api_key.trim().to_string();
        self
    }

    pub fn note_store_configured(&self) -> bool {
        !self.target_url.is_empty() && !self.auth_key.is_empty()
    }

    pub fn model_configured(&self) -> bool {
        !self.model_url.is_empty() && !self.api_key.is_empty()
    }

    /// Whether a note of `kind` should carry a link back to its source page.
    pub fn includes_url(&self, kind: NoteKind) -> bool {
        match kind {
            NoteKind::Summary => self.include_summary_url,
            NoteKind::Extract | NoteKind::Selection => self.include_selection_url,
            NoteKind::Image => self.include_image_url,
            NoteKind::QuickNote => self.include_quick_note_url,
        }
    }

    /// Tag appended to notes of `kind`, if any.
    pub fn tag_for(&self, kind: NoteKind) -> Option<&str> {
        let tag = match kind {
            NoteKind::Summary => &self.summary_tag,
            NoteKind::Extract => &self.extract_tag,
            NoteKind::Selection => &self.selection_tag,
            NoteKind::Image => &self.image_tag,
            NoteKind::QuickNote => return None,
        };
        (!tag.trim().is_empty()).then_some(tag.as_str())
    }

    /// Render the summarization prompt. Only the first `{content}`
    /// placeholder is substituted.
    pub fn render_prompt(&self, content: &str) -> String {
        self.prompt_template.replacen(CONTENT_PLACEHOLDER, content, 1)
    }

    /// Apply a single `key = value` edit using the wire (camelCase) field
    /// name. Used by the CLI `settings set` command.
    pub fn with_field(self, key: &str, value: &str) -> Result<Self, String> {
        let mut object = match serde_json::to_value(&self) {
            Ok(serde_json::Value::Object(object)) => object,
            _ => return Err("settings did not serialize to an object".into()),
        };
        let current =
            object.get(key).ok_or_else(|| format!("unknown settings field `{key}`"))?;
        let parsed = match current {
            serde_json::Value::Bool(_) => value
                .parse::<bool>()
                .map(serde_json::Value::Bool)
                .map_err(|_| format!("`{key}` expects true or false"))?,
            serde_json::Value::Number(_) => value
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .ok_or_else(|| format!("`{key}` expects a number"))?,
            _ => serde_json::Value::String(value.to_string()),
        };
        object.insert(key.to_string(), parsed);
        serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"targetUrl":"https://n.example/api/v1","authKey":"k"}"#)
                .unwrap();
        assert_eq!(settings.model_name, DEFAULT_MODEL_NAME);
        assert!(settings.include_summary_url);
        assert!(!settings.include_quick_note_url);
        assert_eq!(settings.extract_tag, "#Web/Clip");
        assert!(settings.note_store_configured());
        assert!(!settings.model_configured());
    }

    #[test]
    fn normalized_restores_blank_required_fields_but_keeps_empty_tags() {
        let settings = Settings {
            model_name: "  ".into(),
            temperature: 0.0,
            prompt_template: String::new(),
            summary_tag: String::new(),
            ..Settings::default()
        }
        .normalized();

        assert_eq!(settings.model_name, DEFAULT_MODEL_NAME);
        assert_eq!(settings.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(settings.prompt_template, DEFAULT_PROMPT_TEMPLATE);
        assert_eq!(settings.tag_for(NoteKind::Summary), None);
    }

    #[test]
    fn prompt_substitutes_first_placeholder_only() {
        let settings =
            Settings { prompt_template: "A {content} B {content}".into(), ..Settings::default() };
        assert_eq!(settings.render_prompt("x"), "A x B {content}");
    }

    #[test]
    fn quick_notes_never_get_a_tag() {
        assert_eq!(Settings::default().tag_for(NoteKind::QuickNote), None);
        assert_eq!(Settings::default().tag_for(NoteKind::Image), Some("#Web/Image"));
    }

    #[test]
    fn with_field_parses_by_existing_type() {
        let settings = Settings::default()
            .with_field("includeQuickNoteUrl", "true")
            .unwrap()
            .with_field("temperature", "0.9")
            .unwrap()
            .with_field("summaryTag", "#Read")
            .unwrap();
        assert!(settings.include_quick_note_url);
        assert_eq!(settings.temperature, 0.9);
        assert_eq!(settings.summary_tag, "#Read");
    }

    #[test]
    fn with_field_rejects_unknown_keys_and_bad_values() {
        assert!(Settings::default().with_field("nope", "1").is_err());
        assert!(Settings::default().with_field("useJinaApiKey", "maybe").is_err());
    }
}
