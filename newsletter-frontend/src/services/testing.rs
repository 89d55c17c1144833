//! In-memory collaborators for unit tests.

use crate::models::{IdentityUser, Session, TokenGrant};
use crate::services::access_gate::ApprovalChecker;
use crate::services::backend_client::ClientError;
use crate::services::identity_client::{AuthError, IdentityProvider, SignUpOutcome};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use uuid::Uuid;

pub fn grant_for(email: &str, expires_in: i64) -> TokenGrant {
    TokenGrant {
        access_token: format!("access-{}-{}", email, Uuid::new_v4()),
        refresh_token: format!("refresh-{}", email),
        expires_in,
        expires_at: None,
        user: IdentityUser {
            id: format!("user-{}", email),
            email: Some(email.to_string()),
        },
    }
}

/// Identity provider backed by a password map.
#[derive(Default)]
pub struct FakeProvider {
    accounts: Mutex<HashMap<String, String>>,
    pub require_confirmation: AtomicBool,
    pub fail_refresh: AtomicBool,
    /// Refresh fails with a transport error instead of a provider rejection.
    pub refresh_unreachable: AtomicBool,
    /// Park refresh calls until `refresh_released` is notified.
    pub hold_refresh: AtomicBool,
    pub refresh_released: Notify,
    pub fail_sign_out: AtomicBool,
    pub refresh_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn with_account(email: &str, password: &str) -> Self {
        let provider = Self::default();
        provider
            .accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), password.to_string());
        provider
    }

    pub fn add_account(&self, email: &str, password: &str) {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), password.to_string());
    }
}

/// A real `reqwest` error without touching the network: the URL has no scheme.
async fn transport_error() -> AuthError {
    match reqwest::Client::new().get("identity-provider").send().await {
        Err(e) => AuthError::Transport(e),
        Ok(_) => AuthError::NoSession,
    }
}

fn rejected(status: StatusCode, message: &str) -> AuthError {
    AuthError::Provider {
        status,
        message: message.to_string(),
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(rejected(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error saving new user",
            ));
        }
        accounts.insert(email.to_string(), password.to_string());

        if self.require_confirmation.load(Ordering::SeqCst) {
            Ok(SignUpOutcome::ConfirmationRequired {
                email: Some(email.to_string()),
            })
        } else {
            Ok(SignUpOutcome::SignedIn(grant_for(email, 3600)))
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenGrant, AuthError> {
        match self.accounts.lock().unwrap().get(email) {
            Some(stored) if stored == password => Ok(grant_for(email, 3600)),
            _ => Err(rejected(StatusCode::BAD_REQUEST, "Invalid login credentials")),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_refresh.load(Ordering::SeqCst) {
            self.refresh_released.notified().await;
        }
        if self.refresh_unreachable.load(Ordering::SeqCst) {
            return Err(transport_error().await);
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(rejected(StatusCode::BAD_REQUEST, "Invalid Refresh Token"));
        }
        let email = refresh_token.trim_start_matches("refresh-");
        Ok(grant_for(email, 3600))
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(rejected(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"));
        }
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<IdentityUser, AuthError> {
        let email = access_token
            .strip_prefix("access-")
            .and_then(|rest| rest.rsplitn(6, '-').last())
            .ok_or(AuthError::NoSession)?;
        Ok(IdentityUser {
            id: format!("user-{}", email),
            email: Some(email.to_string()),
        })
    }
}

type PendingCheck = (Uuid, oneshot::Sender<Result<bool, ClientError>>);

/// Approval checker whose answers are released by the test, one session at a time.
#[derive(Default)]
pub struct ControlledChecker {
    pending: Mutex<Vec<PendingCheck>>,
    pub calls: AtomicUsize,
}

impl ControlledChecker {
    /// Wait until a check for `session_id` is in flight.
    pub async fn wait_for(&self, session_id: Uuid) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if self.is_pending(session_id) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("approval check was never issued");
    }

    pub fn is_pending(&self, session_id: Uuid) -> bool {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .any(|(id, _)| *id == session_id)
    }

    pub fn resolve(&self, session_id: Uuid, result: Result<bool, ClientError>) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(index) = pending.iter().position(|(id, _)| *id == session_id) {
            let (_, tx) = pending.remove(index);
            let _ = tx.send(result);
        }
    }

    /// Resolve every in-flight check in issue order (or reversed).
    pub fn resolve_all(&self, approved: Option<bool>, reversed: bool) {
        let mut drained: Vec<PendingCheck> = self.pending.lock().unwrap().drain(..).collect();
        if reversed {
            drained.reverse();
        }
        for (_, tx) in drained {
            let _ = tx.send(answer(approved));
        }
    }
}

/// `None` stands for a failed fetch.
pub fn answer(approved: Option<bool>) -> Result<bool, ClientError> {
    approved.ok_or_else(|| ClientError::Http {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "Internal Server Error".to_string(),
    })
}

#[async_trait]
impl ApprovalChecker for ControlledChecker {
    async fn is_approved(&self, session: &Session) -> Result<bool, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push((session.id, tx));
        rx.await.unwrap_or_else(|_| answer(None))
    }
}
