//! Shared setup for integration tests: wiremock stand-ins for the identity
//! provider and the newsletter backend.

#![allow(dead_code)]

use newsletter_frontend::config::{BackendSettings, IdentitySettings};
use newsletter_frontend::services::{BackendClient, GoTrueClient, SessionManager};
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

pub const ANON_KEY: &str = "test-anon-key";
pub const PASSWORD: &str = "pw123456";

pub fn backend_settings(server: &MockServer) -> BackendSettings {
    BackendSettings {
        base_url: format!("{}/", server.uri()),
    }
}

pub fn identity_settings(server: &MockServer) -> IdentitySettings {
    IdentitySettings {
        url: server.uri(),
        anon_key: Secret::new(ANON_KEY.to_string()),
        refresh_margin_secs: 60,
    }
}

pub fn backend(server: &MockServer) -> Arc<BackendClient> {
    Arc::new(BackendClient::new(&backend_settings(server)))
}

pub fn sessions(identity: &MockServer) -> Arc<SessionManager> {
    let provider = Arc::new(GoTrueClient::new(identity_settings(identity)));
    SessionManager::new(provider, chrono::Duration::seconds(60))
}

pub fn access_token_for(email: &str) -> String {
    format!("access-{}", email)
}

pub fn token_body(email: &str) -> Value {
    json!({
        "access_token": access_token_for(email),
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": format!("refresh-{}", email),
        "user": { "id": format!("user-{}", email), "email": email }
    })
}

/// Accept `email` / [`PASSWORD`] on the password grant.
pub async fn mount_account(identity: &MockServer, email: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON_KEY))
        .and(body_partial_json(json!({ "email": email, "password": PASSWORD })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(email)))
        .mount(identity)
        .await;
}

pub async fn mount_logout(identity: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(204))
        .mount(identity)
        .await;
}

pub async fn mount_approval(backend: &MockServer, email: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/api/me/approval-status"))
        .and(header(
            "authorization",
            format!("Bearer {}", access_token_for(email)).as_str(),
        ))
        .respond_with(response)
        .mount(backend)
        .await;
}

pub fn approved(approved: bool) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "approved": approved }))
}

pub fn config_json(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "user_id": "0b3f7f0e-2a7a-4d4c-8a43-1b0c8f3e9d21",
        "title": title,
        "topics": ["AI"],
        "tone": "neutral",
        "length": "medium",
        "send_time_utc": "09:00:00",
        "timezone": "UTC",
        "delivery_email": "a@x.com",
        "is_active": true,
        "features": { "kpis": { "enabled": true, "custom_request": "" } },
        "created_at": "2026-01-05T08:00:00Z",
        "updated_at": "2026-01-05T08:00:00Z"
    })
}

/// Matches requests that carry no `Authorization` header.
pub struct NoAuthorization;

impl Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}
