//! Identity session types.

use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// User record as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token response from the identity provider (password grant, refresh grant or sign-up).
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    /// Absolute expiry as a unix timestamp; preferred over `expires_in` when present.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: IdentityUser,
}

impl TokenGrant {
    pub fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in))
    }
}

/// An authenticated identity plus its bearer credential.
///
/// `id` is assigned locally when the session is established and survives token
/// refreshes, so it identifies "this sign-in" rather than "this token".
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
    access_token: Secret<String>,
    refresh_token: Secret<String>,
}

impl Session {
    pub fn from_grant(id: Uuid, grant: TokenGrant, now: DateTime<Utc>) -> Self {
        let expires_at = grant.expiry(now);
        Self {
            id,
            user_id: grant.user.id,
            email: grant.user.email,
            expires_at,
            access_token: Secret::new(grant.access_token),
            refresh_token: Secret::new(grant.refresh_token),
        }
    }

    pub fn from_persisted(persisted: PersistedSession) -> Self {
        Self {
            id: persisted.id,
            user_id: persisted.user_id,
            email: persisted.email,
            expires_at: persisted.expires_at,
            access_token: Secret::new(persisted.access_token),
            refresh_token: Secret::new(persisted.refresh_token),
        }
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    pub fn refresh_token(&self) -> &str {
        self.refresh_token.expose_secret()
    }

    /// True when the access token expires within `margin` of `now`.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at - margin <= now
    }

    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            id: self.id,
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            expires_at: self.expires_at,
            access_token: self.access_token.expose_secret().clone(),
            refresh_token: self.refresh_token.expose_secret().clone(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Session snapshot stored in the browser session so a fresh client context can
/// restore it.
#[derive(Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub id: Uuid,
    pub user_id: String,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub access_token: String,
    pub refresh_token: String,
}

/// What the session manager currently knows.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Startup restoration has not resolved yet.
    Pending,
    Absent,
    Present(Arc<Session>),
}

impl SessionState {
    pub fn session(&self) -> Option<&Arc<Session>> {
        match self {
            SessionState::Present(session) => Some(session),
            _ => None,
        }
    }

    /// Local id of the current sign-in, if any.
    pub fn identity(&self) -> Option<Uuid> {
        self.session().map(|s| s.id)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SessionState::Pending)
    }
}
