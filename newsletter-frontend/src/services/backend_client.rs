//! HTTP client for the newsletter backend.

use crate::config::BackendSettings;
use crate::models::{ApprovalStatus, Session};
use crate::services::access_gate::ApprovalChecker;
use crate::services::metrics::record_backend_call;
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use service_core::observability::TracedClientExt;
use thiserror::Error;

const APPROVAL_STATUS_PATH: &str = "/api/me/approval-status";

#[derive(Debug, Error)]
pub enum ClientError {
    /// Non-2xx response. `message` is the response text, or the status reason when
    /// the body is unreadable or empty.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response from server: {0}")]
    Decode(String),
}

/// Stateless transport shared by every client context.
///
/// Requests carry `Authorization: Bearer <token>` only when a token is supplied;
/// rejecting anonymous calls is the backend's job.
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<Response, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .traced(method.clone(), &url)
            .maybe_bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send {} request to {}: {}", method, url, e);
            ClientError::Transport(e)
        })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let error = error_from_response(response).await;
            tracing::warn!(method = %method, url = %url, error = %error, "Backend call failed");
            Err(error)
        }
    }

    pub async fn get_json<T>(&self, path: &str, token: Option<&str>) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let response = self.send::<()>(Method::GET, path, token, None).await?;
        decode(response).await
    }

    pub async fn post_json<B, T>(
        &self,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, token, body).await?;
        decode(response).await
    }

    pub async fn put_json<B, T>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::PUT, path, token, Some(body)).await?;
        decode(response).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<(), ClientError> {
        self.send::<()>(Method::DELETE, path, token, None).await?;
        Ok(())
    }

    /// `GET /api/me/approval-status`. Every approval lookup goes through here.
    pub async fn approval_status(
        &self,
        token: Option<&str>,
    ) -> Result<ApprovalStatus, ClientError> {
        let result = self.get_json(APPROVAL_STATUS_PATH, token).await;
        record_backend_call("approval_status", result.is_ok());
        result
    }
}

#[async_trait]
impl ApprovalChecker for BackendClient {
    async fn is_approved(&self, session: &Session) -> Result<bool, ClientError> {
        let status = self.approval_status(Some(session.access_token())).await?;
        Ok(status.approved)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

async fn error_from_response(response: Response) -> ClientError {
    let status = response.status();
    let message = match response.text().await {
        Ok(text) if !text.trim().is_empty() => text,
        _ => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
    };
    ClientError::Http { status, message }
}
