//! Session manager.
//!
//! Owns the current identity session for one client context and publishes every
//! change through a `watch` channel. It is the only writer; the access gate, the
//! newsletter client and the handlers read snapshots.

use crate::models::{PersistedSession, Session, SessionState, TokenGrant};
use crate::services::identity_client::{AuthError, IdentityProvider, SignUpOutcome};
use crate::services::metrics::record_auth_event;
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Lower bound between scheduled refreshes, so a provider issuing very short-lived
/// tokens cannot make the refresh task spin.
const MIN_REFRESH_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// Receiver side of the session channel. Dropping it unsubscribes.
///
/// Subscribers observe the latest state; intermediate states published while the
/// subscriber was not polling are coalesced.
pub struct SessionSubscription {
    rx: watch::Receiver<SessionState>,
}

impl SessionSubscription {
    pub fn current(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    /// Wait for the next change. Returns `None` once the manager is gone.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Handle for a callback registered with [`SessionManager::subscribe_with`].
///
/// The callback stops being invoked when the handle is dropped or
/// [`unsubscribe`](SubscriptionHandle::unsubscribe)d.
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug)]
pub enum SignUpResult {
    SignedIn(Arc<Session>),
    ConfirmationRequired { email: Option<String> },
}

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Sender<SessionState>,
    initialized: OnceCell<()>,
    refresh_margin: Duration,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    weak_self: Weak<Self>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, refresh_margin: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Pending);
        Arc::new_cyclic(|weak_self| Self {
            provider,
            state,
            initialized: OnceCell::new(),
            refresh_margin,
            refresh_task: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.state.borrow().session().cloned()
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            rx: self.state.subscribe(),
        }
    }

    /// Invoke `listener` with the new state on every change after registration.
    pub fn subscribe_with<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(SessionState) + Send + 'static,
    {
        let mut subscription = self.subscribe();
        let task = tokio::spawn(async move {
            while let Some(state) = subscription.changed().await {
                listener(state);
            }
        });
        SubscriptionHandle { task }
    }

    /// Resolve the startup state from a persisted snapshot.
    ///
    /// Runs once; later calls return the current state. A snapshot that is still
    /// valid is adopted as-is, an expired one is refreshed, and anything else
    /// resolves to `Absent`. If a sign-in landed while this was in flight, the
    /// sign-in wins.
    pub async fn initialize(&self, persisted: Option<PersistedSession>) -> SessionState {
        self.initialized
            .get_or_init(|| async move {
                let restored = match persisted {
                    Some(persisted) => self.restore(persisted).await,
                    None => None,
                };

                let state = match restored {
                    Some(session) => SessionState::Present(Arc::new(session)),
                    None => SessionState::Absent,
                };

                let applied = self.state.send_if_modified(|current| {
                    if current.is_pending() {
                        *current = state.clone();
                        true
                    } else {
                        false
                    }
                });

                if applied {
                    if let SessionState::Present(session) = &state {
                        tracing::info!(user_id = %session.user_id, "Restored existing session");
                        record_auth_event("initial_session");
                        self.schedule_refresh(session, self.refresh_delay(session));
                    }
                }
            })
            .await;

        self.current()
    }

    async fn restore(&self, persisted: PersistedSession) -> Option<Session> {
        let session = Session::from_persisted(persisted);
        if !session.expires_within(self.refresh_margin, Utc::now()) {
            return Some(session);
        }

        match self.provider.refresh(session.refresh_token()).await {
            Ok(grant) => Some(Session::from_grant(session.id, grant, Utc::now())),
            Err(e) => {
                tracing::warn!(
                    user_id = %session.user_id,
                    error = %e,
                    "Stored session could not be refreshed"
                );
                None
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<Session>, AuthError> {
        let grant = self
            .provider
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| {
                tracing::info!(email = %email, error = %e, "Sign-in rejected");
                e
            })?;

        let session = self.establish(grant);
        tracing::info!(
            user_id = %session.user_id,
            email = %email,
            "User signed in successfully"
        );
        record_auth_event("signed_in");
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult, AuthError> {
        let outcome = self.provider.sign_up(email, password).await.map_err(|e| {
            tracing::info!(email = %email, error = %e, "Sign-up rejected");
            e
        })?;

        match outcome {
            SignUpOutcome::SignedIn(grant) => {
                let session = self.establish(grant);
                tracing::info!(user_id = %session.user_id, email = %email, "User signed up");
                record_auth_event("signed_up");
                Ok(SignUpResult::SignedIn(session))
            }
            SignUpOutcome::ConfirmationRequired { email: confirmed } => {
                tracing::info!(email = %email, "Sign-up awaiting email confirmation");
                record_auth_event("signup_confirmation_pending");
                Ok(SignUpResult::ConfirmationRequired { email: confirmed })
            }
        }
    }

    /// Revoke the session with the provider (best-effort) and clear it locally.
    pub async fn sign_out(&self) {
        let Some(session) = self.current_session() else {
            return;
        };

        if let Err(e) = self.provider.sign_out(session.access_token()).await {
            tracing::error!("Failed to revoke session during sign-out: {}", e);
        }

        if self.publish_if_current(session.id, SessionState::Absent) {
            tracing::info!(user_id = %session.user_id, "User signed out");
            record_auth_event("signed_out");
        }
    }

    /// Refresh the current session's tokens now.
    pub async fn refresh(&self) -> Result<Arc<Session>, AuthError> {
        let current = self.current_session().ok_or(AuthError::NoSession)?;
        self.refresh_session(current).await
    }

    /// Email of the signed-in user, looked up from the provider with the cached
    /// session email as fallback.
    pub async fn current_user_email(&self) -> Option<String> {
        let session = self.current_session()?;
        match self.provider.get_user(session.access_token()).await {
            Ok(user) => user.email.or_else(|| session.email.clone()),
            Err(e) => {
                tracing::debug!(error = %e, "User lookup failed, using cached email");
                session.email.clone()
            }
        }
    }

    pub fn persisted(&self) -> Option<PersistedSession> {
        self.current_session().map(|s| s.to_persisted())
    }

    fn establish(&self, grant: TokenGrant) -> Arc<Session> {
        let session = Arc::new(Session::from_grant(Uuid::new_v4(), grant, Utc::now()));
        self.state
            .send_replace(SessionState::Present(Arc::clone(&session)));
        self.schedule_refresh(&session, self.refresh_delay(&session));
        session
    }

    async fn refresh_session(&self, current: Arc<Session>) -> Result<Arc<Session>, AuthError> {
        match self.provider.refresh(current.refresh_token()).await {
            Ok(grant) => {
                let refreshed = Arc::new(Session::from_grant(current.id, grant, Utc::now()));
                if self.publish_if_current(current.id, SessionState::Present(refreshed.clone())) {
                    tracing::debug!(user_id = %refreshed.user_id, "Session token refreshed");
                    record_auth_event("token_refreshed");
                }
                Ok(refreshed)
            }
            // The access token still works; try once more when it actually expires.
            Err(AuthError::Transport(e))
                if !current.expires_within(Duration::zero(), Utc::now()) =>
            {
                let until_expiry = (current.expires_at - Utc::now())
                    .to_std()
                    .unwrap_or(MIN_REFRESH_DELAY);
                if self.reschedule_if_current(&current, until_expiry.max(MIN_REFRESH_DELAY)) {
                    tracing::warn!(
                        user_id = %current.user_id,
                        error = %e,
                        "Token refresh failed, keeping session until expiry"
                    );
                } else {
                    tracing::debug!(
                        user_id = %current.user_id,
                        "Refresh failed for a session that was already replaced"
                    );
                }
                Err(AuthError::Transport(e))
            }
            Err(e) => {
                if self.publish_if_current(current.id, SessionState::Absent) {
                    tracing::info!(user_id = %current.user_id, error = %e, "Session expired");
                    record_auth_event("session_expired");
                }
                Err(e)
            }
        }
    }

    /// Replace the state only while `session_id` is still the current sign-in.
    fn publish_if_current(&self, session_id: Uuid, next: SessionState) -> bool {
        let applied = self.state.send_if_modified(|current| {
            if current.identity() == Some(session_id) {
                *current = next.clone();
                true
            } else {
                false
            }
        });

        if applied {
            match &next {
                SessionState::Present(session) => {
                    self.schedule_refresh(session, self.refresh_delay(session))
                }
                _ => self.cancel_refresh(),
            }
        }
        applied
    }

    fn refresh_delay(&self, session: &Session) -> std::time::Duration {
        (session.expires_at - self.refresh_margin - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
            .max(MIN_REFRESH_DELAY)
    }

    fn schedule_refresh(&self, session: &Arc<Session>, delay: std::time::Duration) {
        let task = self.refresh_timer(session.id, delay);
        if let Some(previous) = self.refresh_slot().replace(task) {
            previous.abort();
        }
    }

    fn refresh_timer(&self, session_id: Uuid, delay: std::time::Duration) -> JoinHandle<()> {
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = weak.upgrade() else {
                return;
            };
            let Some(current) = manager.current_session().filter(|s| s.id == session_id) else {
                return;
            };
            // Errors are logged and reflected in the published state.
            let _ = manager.refresh_session(current).await;
        })
    }

    /// Retry later, unless another sign-in replaced `session` meanwhile. The
    /// identity check happens under the slot lock so a newer session's timer is
    /// never aborted.
    fn reschedule_if_current(&self, session: &Arc<Session>, delay: std::time::Duration) -> bool {
        let mut slot = self.refresh_slot();
        if self.current().identity() != Some(session.id) {
            return false;
        }
        let task = self.refresh_timer(session.id, delay);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
        true
    }

    fn cancel_refresh(&self) {
        if let Some(previous) = self.refresh_slot().take() {
            previous.abort();
        }
    }

    fn refresh_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.refresh_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel_refresh();
    }
}
