//! Request extractors that bind a request to its client context and enforce the
//! access gate.

use crate::handlers::auth::{gate_response, AuthMode};
use crate::models::{PersistedSession, Session};
use crate::services::access_gate::GateView;
use crate::services::context::ClientContext;
use crate::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{request::Parts, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

const CONTEXT_ID_KEY: &str = "client_context_id";
const PERSISTED_SESSION_KEY: &str = "identity_session";

/// The caller's client context plus the browser session it is keyed by.
pub struct ClientHandle {
    pub context: Arc<ClientContext>,
    browser: tower_sessions::Session,
}

impl ClientHandle {
    /// Mirror the identity session into the browser session so a fresh context
    /// can restore it. Call after every sign-in, sign-up and sign-out.
    pub async fn persist(&self) {
        let result = match self.context.sessions.persisted() {
            Some(snapshot) => self.browser.insert(PERSISTED_SESSION_KEY, snapshot).await,
            None => self
                .browser
                .remove::<PersistedSession>(PERSISTED_SESSION_KEY)
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            tracing::error!(
                context_id = %self.context.id,
                "Failed to persist identity session: {}",
                e
            );
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ClientHandle {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let browser = tower_sessions::Session::from_request_parts(parts, state).await?;

        let known_id: Option<Uuid> = browser.get(CONTEXT_ID_KEY).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read client context id: {}", e);
            None
        });

        let existing = known_id.and_then(|id| state.registry.get(id));
        let context = match existing {
            Some(context) => {
                context.touch();
                context
            }
            None => {
                let persisted: Option<PersistedSession> =
                    browser.get(PERSISTED_SESSION_KEY).await.unwrap_or_else(|e| {
                        tracing::warn!("Failed to read persisted identity session: {}", e);
                        None
                    });
                state.registry.get_or_create(known_id, persisted)
            }
        };

        if known_id != Some(context.id) {
            browser.insert(CONTEXT_ID_KEY, context.id).await.map_err(|e| {
                tracing::error!("Failed to store client context id: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Session unavailable")
            })?;
        }

        Ok(Self { context, browser })
    }
}

#[derive(Debug, Default, Deserialize)]
struct GateQuery {
    #[serde(default)]
    mode: Option<String>,
}

/// A client context whose gate reads `Approved`.
///
/// Any other gate state rejects with the page for that state: loading, the
/// sign-in form, or the pending-approval notice.
pub struct ApprovedContext {
    pub handle: ClientHandle,
    pub session: Arc<Session>,
}

impl ApprovedContext {
    pub fn context(&self) -> &ClientContext {
        &self.handle.context
    }

    pub fn email(&self) -> String {
        self.session.email.clone().unwrap_or_default()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ApprovedContext {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let handle = ClientHandle::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        handle.context.gate.settled(state.gate_wait).await;
        // Background refreshes change the tokens; keep the browser copy current.
        handle.persist().await;

        match handle.context.gate.view() {
            GateView::Approved { session } => Ok(Self { handle, session }),
            view => {
                let mode = Query::<GateQuery>::try_from_uri(&parts.uri)
                    .map(|Query(q)| AuthMode::from_query(q.mode.as_deref()))
                    .unwrap_or_default();
                tracing::debug!(
                    context_id = %handle.context.id,
                    path = %parts.uri.path(),
                    view = ?view,
                    "Request held at access gate"
                );
                // The loading view re-polls with GET, so only GET routes poll themselves.
                let poll_path = if parts.method == Method::GET {
                    parts.uri.to_string()
                } else {
                    "/dashboard".to_string()
                };
                Err(gate_response(view, mode, &poll_path))
            }
        }
    }
}

/// Whether the request was issued by htmx (`HX-Request: true`).
pub struct HxRequest(pub bool);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for HxRequest {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let is_htmx = parts
            .headers
            .get("HX-Request")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == "true");
        Ok(Self(is_htmx))
    }
}
