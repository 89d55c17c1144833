//! Access gate.
//!
//! Derives what a client may see from its session plus one approval check per
//! sign-in. Every check is tagged with the epoch it was issued in; the epoch moves
//! on every identity change, so a check that outlives its session is dropped
//! instead of being shown to whoever signed in next.

use crate::models::{Session, SessionState};
use crate::services::backend_client::ClientError;
use crate::services::metrics::record_approval_check;
use crate::services::session_manager::{SessionManager, SubscriptionHandle};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Loading,
    Unauthenticated,
    CheckingApproval,
    PendingApproval,
    Approved,
}

impl AccessLevel {
    /// Whether the level can be rendered as-is (nothing is in flight).
    pub fn is_settled(&self) -> bool {
        !matches!(self, AccessLevel::Loading | AccessLevel::CheckingApproval)
    }
}

/// What a gated route should render.
#[derive(Debug, Clone)]
pub enum GateView {
    Loading,
    SignIn,
    PendingApproval { session: Arc<Session> },
    Approved { session: Arc<Session> },
}

#[async_trait]
pub trait ApprovalChecker: Send + Sync {
    async fn is_approved(&self, session: &Session) -> Result<bool, ClientError>;
}

struct GateInner {
    level: AccessLevel,
    epoch: u64,
    identity: Option<Uuid>,
    session: Option<Arc<Session>>,
}

pub struct AccessGate {
    sessions: Arc<SessionManager>,
    checker: Arc<dyn ApprovalChecker>,
    inner: Mutex<GateInner>,
    levels: watch::Sender<AccessLevel>,
    subscription: Mutex<Option<SubscriptionHandle>>,
    weak_self: Weak<Self>,
}

impl AccessGate {
    /// Build a gate and subscribe it to `sessions`.
    ///
    /// The gate holds the only subscription handle; dropping the gate ends it.
    pub fn new(sessions: Arc<SessionManager>, checker: Arc<dyn ApprovalChecker>) -> Arc<Self> {
        let (levels, _) = watch::channel(AccessLevel::Loading);
        let gate = Arc::new_cyclic(|weak_self| Self {
            sessions,
            checker,
            inner: Mutex::new(GateInner {
                level: AccessLevel::Loading,
                epoch: 0,
                identity: None,
                session: None,
            }),
            levels,
            subscription: Mutex::new(None),
            weak_self: weak_self.clone(),
        });

        let weak = Arc::downgrade(&gate);
        let handle = gate.sessions.subscribe_with(move |state| {
            if let Some(gate) = weak.upgrade() {
                gate.observe(&state);
            }
        });
        *lock(&gate.subscription) = Some(handle);

        gate.observe(&gate.sessions.current());
        gate
    }

    /// Current level, reconciled with the session manager's snapshot first.
    pub fn level(&self) -> AccessLevel {
        self.observe(&self.sessions.current());
        lock(&self.inner).level
    }

    pub fn view(&self) -> GateView {
        self.observe(&self.sessions.current());
        let inner = lock(&self.inner);
        match (inner.level, inner.session.clone()) {
            (AccessLevel::Unauthenticated, _) => GateView::SignIn,
            (AccessLevel::PendingApproval, Some(session)) => GateView::PendingApproval { session },
            (AccessLevel::Approved, Some(session)) => GateView::Approved { session },
            _ => GateView::Loading,
        }
    }

    /// Wait up to `timeout` for the level to settle, returning whatever it is then.
    pub async fn settled(&self, timeout: Duration) -> AccessLevel {
        let mut levels = self.levels.subscribe();
        let wait = async {
            loop {
                let level = self.level();
                if level.is_settled() || levels.changed().await.is_err() {
                    return level;
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or_else(|_| self.level())
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.subscription)
            .as_ref()
            .is_some_and(SubscriptionHandle::is_active)
    }

    fn observe(&self, state: &SessionState) {
        let check = {
            let mut inner = lock(&self.inner);
            match state {
                SessionState::Pending => None,
                SessionState::Absent => {
                    if inner.identity.is_some() || inner.level == AccessLevel::Loading {
                        inner.epoch += 1;
                        inner.identity = None;
                        inner.session = None;
                        self.set_level(&mut inner, AccessLevel::Unauthenticated);
                    }
                    None
                }
                SessionState::Present(session) if inner.identity == Some(session.id) => {
                    // Token refresh: same sign-in, keep the approval result.
                    inner.session = Some(Arc::clone(session));
                    None
                }
                SessionState::Present(session) => {
                    inner.epoch += 1;
                    inner.identity = Some(session.id);
                    inner.session = Some(Arc::clone(session));
                    self.set_level(&mut inner, AccessLevel::CheckingApproval);
                    Some((inner.epoch, Arc::clone(session)))
                }
            }
        };

        if let Some((epoch, session)) = check {
            self.spawn_check(epoch, session);
        }
    }

    fn spawn_check(&self, epoch: u64, session: Arc<Session>) {
        tracing::debug!(user_id = %session.user_id, epoch, "Checking approval status");
        let checker = Arc::clone(&self.checker);
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            let result = checker.is_approved(&session).await;
            if let Some(gate) = weak.upgrade() {
                gate.resolve(epoch, &session, result);
            }
        });
    }

    fn resolve(&self, epoch: u64, session: &Session, result: Result<bool, ClientError>) {
        let mut inner = lock(&self.inner);
        if inner.epoch != epoch {
            tracing::debug!(
                user_id = %session.user_id,
                epoch,
                current_epoch = inner.epoch,
                "Discarding approval result for superseded session"
            );
            record_approval_check("stale");
            return;
        }

        let level = match result {
            Ok(true) => {
                record_approval_check("approved");
                AccessLevel::Approved
            }
            Ok(false) => {
                record_approval_check("pending");
                AccessLevel::PendingApproval
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %session.user_id,
                    error = %e,
                    "Approval check failed, treating user as not approved"
                );
                record_approval_check("failed");
                AccessLevel::PendingApproval
            }
        };
        tracing::info!(user_id = %session.user_id, level = ?level, "Approval resolved");
        self.set_level(&mut inner, level);
    }

    fn set_level(&self, inner: &mut GateInner, level: AccessLevel) {
        inner.level = level;
        self.levels.send_if_modified(|current| {
            if *current == level {
                false
            } else {
                *current = level;
                true
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
