use secrecy::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CRATE_DIRECTORY: &str = "newsletter-frontend";

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub identity: IdentitySettings,
    #[serde(default)]
    pub editor: EditorSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Browser sessions (and their client contexts) expire after this much inactivity.
    #[serde(default = "default_session_inactivity_hours")]
    pub session_inactivity_hours: i64,
    /// How long a gated page waits for the access gate to settle before rendering
    /// the loading view.
    #[serde(default = "default_gate_wait_ms")]
    pub gate_wait_ms: u64,
}

fn default_session_inactivity_hours() -> i64 {
    24
}

fn default_gate_wait_ms() -> u64 {
    2_000
}

#[derive(Deserialize, Clone)]
pub struct BackendSettings {
    /// Base URL of the newsletter API, e.g. https://api.example.com
    pub base_url: String,
}

#[derive(Deserialize, Clone)]
pub struct IdentitySettings {
    /// Base URL of the identity provider project, e.g. https://PROJECT.supabase.co
    pub url: String,
    /// Public (anon) API key sent as the `apikey` header.
    pub anon_key: Secret<String>,
    /// Access tokens are refreshed this many seconds before they expire.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
}

fn default_refresh_margin_secs() -> i64 {
    60
}

/// Optional editor inputs. Title, send time, delivery email, the active flag and
/// the feature toggles are always shown.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptionalField {
    Topics,
    Tone,
    Length,
    Timezone,
}

#[derive(Deserialize, Clone, Debug)]
pub struct EditorSettings {
    #[serde(default = "all_optional_fields")]
    pub optional_fields: Vec<OptionalField>,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            optional_fields: all_optional_fields(),
        }
    }
}

fn all_optional_fields() -> Vec<OptionalField> {
    vec![
        OptionalField::Topics,
        OptionalField::Tone,
        OptionalField::Length,
        OptionalField::Timezone,
    ]
}

#[derive(Deserialize, Clone, Debug)]
pub struct TelemetrySettings {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP/gRPC collector endpoint; span export is disabled when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_service_name() -> String {
    "newsletter-frontend".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The crate directory, whether started from the workspace root or from the
/// crate itself. `config/` and `static/` live under it.
pub fn crate_directory() -> std::io::Result<PathBuf> {
    Ok(crate_directory_from(&std::env::current_dir()?))
}

fn crate_directory_from(base_path: &Path) -> PathBuf {
    if base_path.ends_with(CRATE_DIRECTORY) {
        base_path.to_path_buf()
    } else {
        base_path.join(CRATE_DIRECTORY)
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let configuration_directory = crate_directory()
        .map_err(|e| {
            config::ConfigError::Message(format!(
                "Failed to determine the current directory: {}",
                e
            ))
        })?
        .join("config");

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("editor.optional_fields")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
