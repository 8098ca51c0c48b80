// `clipnote settings`: show, edit, reset or fetch settings.

use clap::{Args, Subcommand};
use clipnote_common::settings::Settings;
use clipnote_daemon::collab::BlinkoClient;
use clipnote_daemon::settings_store::SettingsStore;

use crate::output::OutputFormat;
use crate::session::Session;

const MASK: &str = "********";

#[derive(Debug, Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    action: SettingsAction,

    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Show,
    /// Change one field by its camelCase name (e.g. `targetUrl`)
    Set { key: String, value: String },
    /// Restore every field to its default
    Reset,
    /// Copy the AI endpoint configured on the note server
    FetchAi,
}

pub fn run(args: SettingsArgs, session: &Session) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let timeout = session.config().http_timeout();
    let result = session.run(|runtime| async move {
        let store = runtime.store();
        let sender = runtime.router().sender();
        match args.action {
            SettingsAction::Show => SettingsStore::load(store),
            SettingsAction::Set { key, value } => {
                let updated = SettingsStore::load(store)?
                    .with_field(&key, &value)
                    .map_err(anyhow::Error::msg)?;
                SettingsStore::save_and_broadcast(store, &sender, &updated)
            }
            SettingsAction::Reset => SettingsStore::reset(store),
            SettingsAction::FetchAi => {
                let current = SettingsStore::load(store)?;
                let fetched = BlinkoClient::new(timeout)?.fetch_ai_config(&current).await?;
                SettingsStore::save_and_broadcast(store, &sender, &fetched)
            }
        }
    });
    super::report(format, result.map(|settings| masked(&settings)), format_human).map(|_| ())
}

/// Settings with credentials hidden.
fn masked(settings: &Settings) -> Settings {
    let mask = |value: &str| if value.is_empty() { String::new() } else { MASK.to_string() };
    Settings { auth_key: mask(&settings.auth_key), api_key: mask(&settings.api_key), ..settings.clone() }
}

fn format_human(settings: &Settings) -> String {
    let mut lines = Vec::new();
    if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(settings) {
        for (key, value) in fields {
            let value = match value {
                serde_json::Value::String(text) if key == "promptTemplate" => {
                    text.lines().next().unwrap_or_default().to_string() + " ..."
                }
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            lines.push(format!("{key:<24} {value}"));
        }
    }
    lines.join("\n")
}
