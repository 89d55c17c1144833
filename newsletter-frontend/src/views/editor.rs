//! Editor form state: defaults, loading a stored record, reading a submitted
//! form, and turning it back into a request body.

use crate::config::{EditorSettings, OptionalField};
use crate::models::{FeatureConfig, FeatureMap, NewsletterConfig, NewsletterPayload};
use crate::services::backend_client::ClientError;
use crate::services::newsletter_client::NewsletterApi;
use uuid::Uuid;

pub struct FeatureSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub placeholder: &'static str,
    pub enabled_by_default: bool,
}

pub const FEATURES: [FeatureSpec; 4] = [
    FeatureSpec {
        key: "kpis",
        label: "KPIs",
        description: "Key performance indicators: metrics, trends, and how they compare to targets or prior period.",
        placeholder: "e.g. Revenue, conversion, churn; compare to last quarter and highlight outliers.",
        enabled_by_default: true,
    },
    FeatureSpec {
        key: "competitor_analysis",
        label: "Competitor analysis",
        description: "Summary of what competitors are doing and how they compare.",
        placeholder: "e.g. Focus on pricing moves and who's gaining share in EMEA.",
        enabled_by_default: false,
    },
    FeatureSpec {
        key: "market_segment_summary",
        label: "Market segment summary",
        description: "Overview of market segments, size, and how they are changing.",
        placeholder: "e.g. Break out by enterprise vs SMB and call out growth rates.",
        enabled_by_default: false,
    },
    FeatureSpec {
        key: "identify_risks",
        label: "Identify risks",
        description: "Risks and uncertainties that could affect your business or market.",
        placeholder: "e.g. Include regulatory and supply chain, rank by likelihood.",
        enabled_by_default: false,
    },
];

pub const TONES: [&str; 4] = ["neutral", "playful", "serious", "professional"];
pub const LENGTHS: [&str; 3] = ["short", "medium", "long"];

const DEFAULT_SEND_TIME: &str = "09:00";

pub fn default_features() -> FeatureMap {
    FEATURES
        .iter()
        .map(|spec| {
            (
                spec.key.to_string(),
                FeatureConfig::new(spec.enabled_by_default, ""),
            )
        })
        .collect()
}

/// Split on `,` or `;`, trim, drop empties. Order is kept.
pub fn parse_topics(input: &str) -> Vec<String> {
    input
        .split([',', ';'])
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}

/// Which optional inputs the editor shows. Hidden inputs are left out of the
/// request body entirely.
#[derive(Debug, Clone)]
pub struct EditorFields {
    shown: Vec<OptionalField>,
}

impl EditorFields {
    pub fn new(settings: &EditorSettings) -> Self {
        Self {
            shown: settings.optional_fields.clone(),
        }
    }

    pub fn all() -> Self {
        Self::new(&EditorSettings::default())
    }

    pub fn shows(&self, field: OptionalField) -> bool {
        self.shown.contains(&field)
    }

    pub fn topics(&self) -> bool {
        self.shows(OptionalField::Topics)
    }

    pub fn tone(&self) -> bool {
        self.shows(OptionalField::Tone)
    }

    pub fn length(&self) -> bool {
        self.shows(OptionalField::Length)
    }

    pub fn timezone(&self) -> bool {
        self.shows(OptionalField::Timezone)
    }
}

/// One feature toggle as rendered.
pub struct FeatureRow {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub placeholder: &'static str,
    pub enabled: bool,
    pub custom_request: String,
}

pub struct CarriedFeature {
    pub key: String,
    pub enabled: bool,
    pub custom_request: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditorForm {
    pub title: String,
    pub topics: Vec<String>,
    pub tone: String,
    pub length: String,
    pub send_time_utc: String,
    pub timezone: String,
    pub delivery_email: String,
    pub is_active: bool,
    pub features: FeatureMap,
}

impl Default for EditorForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            topics: Vec::new(),
            tone: "neutral".to_string(),
            length: "medium".to_string(),
            send_time_utc: DEFAULT_SEND_TIME.to_string(),
            timezone: "UTC".to_string(),
            delivery_email: String::new(),
            is_active: true,
            features: default_features(),
        }
    }
}

impl EditorForm {
    /// Fill the delivery address from the signed-in user unless one is set.
    pub fn with_delivery_email_prefill(mut self, email: Option<String>) -> Self {
        if self.delivery_email.is_empty() {
            if let Some(email) = email {
                self.delivery_email = email;
            }
        }
        self
    }

    /// Form state for a stored record: stored features over the defaults, send
    /// time cut to HH:MM.
    pub fn from_config(config: &NewsletterConfig) -> Self {
        let mut features = default_features();
        features.extend(
            config
                .features
                .iter()
                .map(|(key, feature)| (key.clone(), feature.clone())),
        );

        let send_time_utc = match config.send_time_utc.get(..5) {
            Some(hh_mm) => hh_mm.to_string(),
            None if config.send_time_utc.is_empty() => DEFAULT_SEND_TIME.to_string(),
            None => config.send_time_utc.clone(),
        };

        Self {
            title: config.title.clone(),
            topics: config.topics.clone(),
            tone: config.tone.clone(),
            length: config.length.clone(),
            send_time_utc,
            timezone: config.timezone.clone(),
            delivery_email: config.delivery_email.clone(),
            is_active: config.is_active,
            features,
        }
    }

    /// Read an urlencoded editor submission.
    ///
    /// Checkboxes are only present when ticked. Feature inputs are named
    /// `feature.<key>.enabled` and `feature.<key>.custom_request`. Keys outside
    /// the catalog arrive as hidden inputs and are kept, so stored features the
    /// editor does not show survive a save.
    pub fn from_submission(fields: &[(String, String)]) -> Self {
        let mut form = Self {
            is_active: false,
            features: FEATURES
                .iter()
                .map(|spec| (spec.key.to_string(), FeatureConfig::default()))
                .collect(),
            ..Self::default()
        };

        for (name, value) in fields {
            match name.as_str() {
                "title" => form.title = value.trim().to_string(),
                "topics" => form.topics = parse_topics(value),
                "tone" => form.tone = value.clone(),
                "length" => form.length = value.clone(),
                "send_time_utc" => form.send_time_utc = value.trim().to_string(),
                "timezone" => form.timezone = value.trim().to_string(),
                "delivery_email" => form.delivery_email = value.trim().to_string(),
                "is_active" => form.is_active = true,
                other => {
                    let Some((key, attribute)) = other
                        .strip_prefix("feature.")
                        .and_then(|rest| rest.rsplit_once('.'))
                    else {
                        continue;
                    };
                    if key.is_empty() {
                        continue;
                    }
                    match attribute {
                        "enabled" => form.set_feature(key, Some(true), None),
                        "custom_request" => form.set_feature(key, None, Some(value)),
                        _ => {}
                    }
                }
            }
        }
        form
    }

    pub fn set_feature(&mut self, key: &str, enabled: Option<bool>, custom_request: Option<&str>) {
        let feature = self.features.entry(key.to_string()).or_default();
        if let Some(enabled) = enabled {
            feature.enabled = enabled;
        }
        if let Some(custom_request) = custom_request {
            feature.custom_request = custom_request.to_string();
        }
    }

    pub fn topics_text(&self) -> String {
        self.topics.join(", ")
    }

    pub fn feature_rows(&self) -> Vec<FeatureRow> {
        FEATURES
            .iter()
            .map(|spec| {
                let feature = self.features.get(spec.key);
                FeatureRow {
                    key: spec.key,
                    label: spec.label,
                    description: spec.description,
                    placeholder: spec.placeholder,
                    enabled: feature.is_some_and(|f| f.enabled),
                    custom_request: feature.map(|f| f.custom_request.clone()).unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Stored features outside the catalog, rendered as hidden inputs.
    pub fn carried_features(&self) -> Vec<CarriedFeature> {
        self.features
            .iter()
            .filter(|(key, _)| !FEATURES.iter().any(|spec| spec.key == key.as_str()))
            .map(|(key, feature)| CarriedFeature {
                key: key.clone(),
                enabled: feature.enabled,
                custom_request: feature.custom_request.clone(),
            })
            .collect()
    }

    /// Problems the backend would reject anyway, reported before calling it.
    pub fn validate(&self) -> Result<(), String> {
        if self.delivery_email.is_empty() {
            return Err("Destination email address is required.".to_string());
        }
        let valid_time = chrono::NaiveTime::parse_from_str(&self.send_time_utc, "%H:%M").is_ok();
        if !valid_time {
            return Err("Daily send time must be HH:MM.".to_string());
        }
        Ok(())
    }

    pub fn to_payload(&self, fields: &EditorFields) -> NewsletterPayload {
        NewsletterPayload {
            title: Some(self.title.clone()),
            topics: fields.topics().then(|| self.topics.clone()),
            tone: fields.tone().then(|| self.tone.clone()),
            length: fields.length().then(|| self.length.clone()),
            send_time_utc: Some(self.send_time_utc.clone()),
            timezone: fields.timezone().then(|| self.timezone.clone()),
            delivery_email: Some(self.delivery_email.clone()),
            is_active: Some(self.is_active),
            features: Some(self.features.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Create,
    Edit(Uuid),
}

impl EditorMode {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            EditorMode::Create => None,
            EditorMode::Edit(id) => Some(*id),
        }
    }
}

/// Create when there is no id, full update when there is one.
pub async fn submit(
    api: &dyn NewsletterApi,
    mode: EditorMode,
    form: &EditorForm,
    fields: &EditorFields,
) -> Result<NewsletterConfig, ClientError> {
    let payload = form.to_payload(fields);
    match mode {
        EditorMode::Create => api.create(&payload).await,
        EditorMode::Edit(id) => api.update(id, &payload).await,
    }
}

/// Trigger a sample for a stored record and describe where it went.
pub async fn send_sample(
    api: &dyn NewsletterApi,
    id: Uuid,
    delivery_email: &str,
) -> Result<String, ClientError> {
    api.send_sample(id, None).await?;
    let target = if delivery_email.is_empty() {
        "your delivery email"
    } else {
        delivery_email
    };
    Ok(format!("Sample sent to {}.", target))
}
