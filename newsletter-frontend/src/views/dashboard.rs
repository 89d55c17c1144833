//! Dashboard list state and the confirm-then-delete flow.

use crate::models::NewsletterConfig;
use crate::services::newsletter_client::NewsletterApi;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardEntry {
    pub id: Uuid,
    pub title: String,
    pub delivery_email: String,
    pub status: &'static str,
}

impl From<&NewsletterConfig> for DashboardEntry {
    fn from(config: &NewsletterConfig) -> Self {
        Self {
            id: config.id,
            title: config.display_title().to_string(),
            delivery_email: config.delivery_email.clone(),
            status: config.status_label(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Dashboard {
    pub entries: Vec<DashboardEntry>,
    pub error: Option<String>,
}

impl Dashboard {
    pub async fn load(api: &dyn NewsletterApi) -> Self {
        match api.list().await {
            Ok(configs) => Self {
                entries: configs.iter().map(DashboardEntry::from).collect(),
                error: None,
            },
            Err(e) => Self {
                entries: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Drop the entry for `id`. Returns whether one was there.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Run a delete for one listed entry and apply the result to the list.
    pub async fn delete(
        &mut self,
        api: &dyn NewsletterApi,
        id: Uuid,
        confirmation: Confirmation,
    ) -> DeleteOutcome {
        let outcome = delete_config(api, id, confirmation).await;
        match &outcome {
            DeleteOutcome::Deleted => {
                self.remove(id);
                self.error = None;
            }
            DeleteOutcome::Failed(message) => self.error = Some(message.clone()),
            DeleteOutcome::Cancelled => {}
        }
        outcome
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Cancelled,
}

impl Confirmation {
    /// Interpret the `confirmed` form field of a delete request.
    pub fn from_field(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("true") | Some("yes") | Some("on") => Confirmation::Confirmed,
            _ => Confirmation::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Cancelled,
    Failed(String),
}

/// Delete `id` once the user has confirmed. A cancelled request makes no call.
pub async fn delete_config(
    api: &dyn NewsletterApi,
    id: Uuid,
    confirmation: Confirmation,
) -> DeleteOutcome {
    if confirmation == Confirmation::Cancelled {
        return DeleteOutcome::Cancelled;
    }
    match api.delete(id).await {
        Ok(()) => DeleteOutcome::Deleted,
        Err(e) => DeleteOutcome::Failed(e.to_string()),
    }
}
