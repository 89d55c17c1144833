//! Identity provider client.
//!
//! Speaks the GoTrue REST API (the auth service behind Supabase projects). The
//! [`IdentityProvider`] trait is the seam the session manager depends on, so tests
//! can swap in an in-memory provider.

use crate::config::IdentitySettings;
use crate::models::{IdentityUser, TokenGrant};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::observability::{TracedClientExt, TracedRequest};
use thiserror::Error;

/// Message the provider returns when sign-up hits an existing account.
pub const DUPLICATE_SIGNUP_MESSAGE: &str = "Database error saving new user";

/// What the user sees instead of [`DUPLICATE_SIGNUP_MESSAGE`].
pub const DUPLICATE_SIGNUP_HINT: &str =
    "An account with this email may already exist. Try signing in instead.";

#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider answered with an error; `message` is its own wording.
    #[error("{message}")]
    Provider { status: StatusCode, message: String },

    #[error("Identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected identity provider response: {0}")]
    Decode(String),

    #[error("No active session")]
    NoSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    SignIn,
    SignUp,
}

impl AuthError {
    /// Message to show on the sign-in form.
    ///
    /// Provider messages pass through verbatim except the duplicate-account failure
    /// on sign-up, which is rewritten into something actionable.
    pub fn user_message(&self, action: AuthAction) -> String {
        match self {
            AuthError::Provider { message, .. }
                if action == AuthAction::SignUp && message == DUPLICATE_SIGNUP_MESSAGE =>
            {
                DUPLICATE_SIGNUP_HINT.to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result of a sign-up call.
#[derive(Debug)]
pub enum SignUpOutcome {
    /// The account is usable immediately.
    SignedIn(TokenGrant),
    /// The provider requires email confirmation before a session is issued.
    ConfirmationRequired { email: Option<String> },
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenGrant, AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;

    /// Revoke the session server-side.
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    async fn get_user(&self, access_token: &str) -> Result<IdentityUser, AuthError>;
}

pub struct GoTrueClient {
    client: Client,
    settings: IdentitySettings,
}

impl GoTrueClient {
    pub fn new(settings: IdentitySettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.settings.url.trim_end_matches('/'), path)
    }

    fn with_api_key(&self, request: TracedRequest) -> TracedRequest {
        request.header("apikey", self.settings.anon_key.expose_secret())
    }

    async fn send(&self, request: TracedRequest, url: &str) -> Result<Response, AuthError> {
        let response = self.with_api_key(request).send().await.map_err(|e| {
            tracing::error!("Failed to reach identity provider at {}: {}", url, e);
            AuthError::Transport(e)
        })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(provider_error(response).await)
        }
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<TokenGrant, AuthError> {
        let url = self.url(&format!("/token?grant_type={}", grant_type));
        let response = self
            .send(self.client.traced_post(&url).json(&body), &url)
            .await?;

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let url = self.url("/signup");
        let response = self
            .send(
                self.client.traced_post(&url).json(&serde_json::json!({
                    "email": email,
                    "password": password,
                })),
                &url,
            )
            .await?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        parse_sign_up(body)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenGrant, AuthError> {
        self.token_grant(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        self.token_grant(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let url = self.url("/logout");
        self.send(self.client.traced_post(&url).bearer_auth(access_token), &url)
            .await?;
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<IdentityUser, AuthError> {
        let url = self.url("/user");
        let response = self
            .send(self.client.traced_get(&url).bearer_auth(access_token), &url)
            .await?;

        response
            .json::<IdentityUser>()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))
    }
}

/// Sign-up answers with a full token grant when the account is active right away,
/// or with the bare user object when confirmation is pending.
fn parse_sign_up(body: serde_json::Value) -> Result<SignUpOutcome, AuthError> {
    if body.get("access_token").is_some() {
        let grant = serde_json::from_value::<TokenGrant>(body)
            .map_err(|e| AuthError::Decode(e.to_string()))?;
        return Ok(SignUpOutcome::SignedIn(grant));
    }

    let email = body
        .get("email")
        .or_else(|| body.get("user").and_then(|u| u.get("email")))
        .and_then(|e| e.as_str())
        .map(|e| e.to_string());

    Ok(SignUpOutcome::ConfirmationRequired { email })
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    msg: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

async fn provider_error(response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AuthError::Provider {
        status,
        message: provider_message(status, &body),
    }
}

/// Extract the human-readable message from a provider error body.
fn provider_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ProviderErrorBody>(body) {
        let message = parsed
            .msg
            .or(parsed.error_description)
            .or(parsed.message)
            .or(parsed.error);
        if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
            return message;
        }
    }

    if !body.trim().is_empty() {
        return body.trim().to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("Authentication failed")
        .to_string()
}
