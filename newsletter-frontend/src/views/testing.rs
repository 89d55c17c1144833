//! In-memory newsletter API for view-model tests.

use crate::models::{NewsletterConfig, NewsletterPayload, SampleSent};
use crate::services::backend_client::ClientError;
use crate::services::newsletter_client::NewsletterApi;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryNewsletters {
    records: Mutex<Vec<NewsletterConfig>>,
    pub deleted: Mutex<Vec<Uuid>>,
    pub samples: Mutex<Vec<Uuid>>,
    /// Fail the next call with a 500.
    pub fail_next: AtomicBool,
}

impl InMemoryNewsletters {
    pub fn with_records(count: usize) -> Self {
        let api = Self::default();
        api.records
            .lock()
            .unwrap()
            .extend((0..count).map(|_| Self::record(Uuid::new_v4(), "09:00:00")));
        api
    }

    pub fn record(id: Uuid, send_time_utc: &str) -> NewsletterConfig {
        NewsletterConfig {
            id,
            user_id: Uuid::new_v4(),
            title: String::new(),
            topics: Vec::new(),
            tone: "neutral".to_string(),
            length: "medium".to_string(),
            send_time_utc: send_time_utc.to_string(),
            timezone: "UTC".to_string(),
            delivery_email: "a@x.com".to_string(),
            is_active: true,
            features: Default::default(),
            created_at: None,
            updated_at: None,
        }
    }

    fn check(&self) -> Result<(), ClientError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ClientError::Http {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Internal Server Error".to_string(),
            });
        }
        Ok(())
    }

    fn not_found() -> ClientError {
        ClientError::Http {
            status: StatusCode::NOT_FOUND,
            message: "Not Found".to_string(),
        }
    }
}

fn apply(config: &mut NewsletterConfig, payload: &NewsletterPayload) {
    let payload = payload.clone();
    if let Some(title) = payload.title {
        config.title = title;
    }
    if let Some(topics) = payload.topics {
        config.topics = topics;
    }
    if let Some(tone) = payload.tone {
        config.tone = tone;
    }
    if let Some(length) = payload.length {
        config.length = length;
    }
    if let Some(send_time_utc) = payload.send_time_utc {
        // Stored with seconds, as a SQL `time` column would.
        config.send_time_utc = format!("{}:00", send_time_utc);
    }
    if let Some(timezone) = payload.timezone {
        config.timezone = timezone;
    }
    if let Some(delivery_email) = payload.delivery_email {
        config.delivery_email = delivery_email;
    }
    if let Some(is_active) = payload.is_active {
        config.is_active = is_active;
    }
    if let Some(features) = payload.features {
        config.features = features;
    }
}

#[async_trait]
impl NewsletterApi for InMemoryNewsletters {
    async fn list(&self) -> Result<Vec<NewsletterConfig>, ClientError> {
        self.check()?;
        Ok(self.records.lock().unwrap().clone())
    }

    async fn get(&self, id: Uuid) -> Result<NewsletterConfig, ClientError> {
        self.check()?;
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn create(&self, payload: &NewsletterPayload) -> Result<NewsletterConfig, ClientError> {
        self.check()?;
        let mut config = Self::record(Uuid::new_v4(), "09:00:00");
        apply(&mut config, payload);
        self.records.lock().unwrap().push(config.clone());
        Ok(config)
    }

    async fn update(
        &self,
        id: Uuid,
        payload: &NewsletterPayload,
    ) -> Result<NewsletterConfig, ClientError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let config = records
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(Self::not_found)?;
        apply(config, payload);
        Ok(config.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), ClientError> {
        self.check()?;
        self.deleted.lock().unwrap().push(id);
        self.records.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }

    async fn send_sample(
        &self,
        id: Uuid,
        _overrides: Option<&NewsletterPayload>,
    ) -> Result<SampleSent, ClientError> {
        self.check()?;
        self.samples.lock().unwrap().push(id);
        Ok(SampleSent { sent: true })
    }
}
