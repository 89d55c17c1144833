//! Newsletter configuration client.
//!
//! Binds the shared [`BackendClient`] to one client context's session manager:
//! every call reads the current bearer token at call time and omits the header
//! when signed out.

use crate::models::{ApprovalStatus, NewsletterConfig, NewsletterPayload, SampleSent};
use crate::services::backend_client::{BackendClient, ClientError};
use crate::services::metrics::record_backend_call;
use crate::services::session_manager::SessionManager;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

const NEWSLETTERS_PATH: &str = "/api/me/newsletters";

/// CRUD surface the dashboard and editor view models are written against.
#[async_trait]
pub trait NewsletterApi: Send + Sync {
    async fn list(&self) -> Result<Vec<NewsletterConfig>, ClientError>;

    async fn get(&self, id: Uuid) -> Result<NewsletterConfig, ClientError>;

    async fn create(&self, payload: &NewsletterPayload) -> Result<NewsletterConfig, ClientError>;

    /// Full replace of the stored record.
    async fn update(
        &self,
        id: Uuid,
        payload: &NewsletterPayload,
    ) -> Result<NewsletterConfig, ClientError>;

    async fn delete(&self, id: Uuid) -> Result<(), ClientError>;

    /// Trigger a one-off sample send. `overrides` is sent as the body when given.
    async fn send_sample(
        &self,
        id: Uuid,
        overrides: Option<&NewsletterPayload>,
    ) -> Result<SampleSent, ClientError>;
}

pub struct NewsletterClient {
    backend: Arc<BackendClient>,
    sessions: Arc<SessionManager>,
}

impl NewsletterClient {
    pub fn new(backend: Arc<BackendClient>, sessions: Arc<SessionManager>) -> Self {
        Self { backend, sessions }
    }

    pub async fn approval_status(&self) -> Result<ApprovalStatus, ClientError> {
        let token = self.token();
        self.backend.approval_status(token.as_deref()).await
    }

    fn token(&self) -> Option<String> {
        self.sessions
            .current_session()
            .map(|session| session.access_token().to_string())
    }
}

fn item_path(id: Uuid) -> String {
    format!("{}/{}", NEWSLETTERS_PATH, id)
}

#[async_trait]
impl NewsletterApi for NewsletterClient {
    async fn list(&self) -> Result<Vec<NewsletterConfig>, ClientError> {
        let token = self.token();
        let result = self.backend.get_json(NEWSLETTERS_PATH, token.as_deref()).await;
        record_backend_call("list", result.is_ok());
        result
    }

    async fn get(&self, id: Uuid) -> Result<NewsletterConfig, ClientError> {
        let token = self.token();
        let result = self.backend.get_json(&item_path(id), token.as_deref()).await;
        record_backend_call("get", result.is_ok());
        result
    }

    async fn create(&self, payload: &NewsletterPayload) -> Result<NewsletterConfig, ClientError> {
        let token = self.token();
        let result: Result<NewsletterConfig, ClientError> = self
            .backend
            .post_json(NEWSLETTERS_PATH, token.as_deref(), Some(payload))
            .await;
        record_backend_call("create", result.is_ok());
        if let Ok(config) = &result {
            tracing::info!(newsletter_id = %config.id, "Newsletter created");
        }
        result
    }

    async fn update(
        &self,
        id: Uuid,
        payload: &NewsletterPayload,
    ) -> Result<NewsletterConfig, ClientError> {
        let token = self.token();
        let result = self
            .backend
            .put_json(&item_path(id), token.as_deref(), payload)
            .await;
        record_backend_call("update", result.is_ok());
        if result.is_ok() {
            tracing::info!(newsletter_id = %id, "Newsletter updated");
        }
        result
    }

    async fn delete(&self, id: Uuid) -> Result<(), ClientError> {
        let token = self.token();
        let result = self.backend.delete(&item_path(id), token.as_deref()).await;
        record_backend_call("delete", result.is_ok());
        if result.is_ok() {
            tracing::info!(newsletter_id = %id, "Newsletter deleted");
        }
        result
    }

    async fn send_sample(
        &self,
        id: Uuid,
        overrides: Option<&NewsletterPayload>,
    ) -> Result<SampleSent, ClientError> {
        let token = self.token();
        let path = format!("{}/send-sample", item_path(id));
        let result = self
            .backend
            .post_json(&path, token.as_deref(), overrides)
            .await;
        record_backend_call("send_sample", result.is_ok());
        result
    }
}
