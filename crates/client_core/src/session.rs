//! Session gate: turns the cookie credential into a full user record, or into a
//! reason the caller has to go back to the login view.

use std::{sync::Arc, time::Duration};

use shared::{domain::UserId, protocol::UserRecord};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{error::FailureKind, SessionCheck, ShippingBackend};

pub const SESSION_CHECK_ATTEMPTS: u32 = 3;
pub const SESSION_CHECK_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bounds the wait for a freshly issued cookie to show up on `/check_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: SESSION_CHECK_ATTEMPTS,
            delay: SESSION_CHECK_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Authenticated(UserRecord),
    Unauthenticated(UnauthenticatedReason),
}

impl Identity {
    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Identity::Authenticated(user) => Some(user),
            Identity::Unauthenticated(_) => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnauthenticatedReason {
    #[error("session check rejected with status {status}")]
    Rejected { status: u16 },
    #[error("session not established after {attempts} attempts")]
    NotEstablished { attempts: u32 },
    #[error("session check failed: {0}")]
    SessionCheckFailed(String),
    #[error("user record unavailable: {0}")]
    UserFetchFailed(String),
    #[error("session belongs to user {session} but record is for user {record}")]
    UserMismatch { session: UserId, record: UserId },
    #[error("session resolution cancelled")]
    Cancelled,
}

impl UnauthenticatedReason {
    pub fn kind(&self) -> FailureKind {
        FailureKind::AuthFailure
    }
}

/// Owner side of a cancellation signal. Dropping it cancels as well, so a view
/// that goes away never leaves a retry timer behind.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

#[derive(Clone)]
pub struct SessionGate {
    backend: Arc<dyn ShippingBackend>,
    retry: RetryPolicy,
}

impl SessionGate {
    pub fn new(backend: Arc<dyn ShippingBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn resolve_identity(&self) -> Identity {
        let (_handle, signal) = cancellation();
        self.resolve_identity_until(signal).await
    }

    pub async fn resolve_identity_until(&self, mut cancel: CancelSignal) -> Identity {
        match self.resolve(&mut cancel).await {
            Ok(user) => Identity::Authenticated(user),
            Err(reason) => {
                warn!(%reason, "session: unauthenticated");
                Identity::Unauthenticated(reason)
            }
        }
    }

    async fn resolve(&self, cancel: &mut CancelSignal) -> Result<UserRecord, UnauthenticatedReason> {
        let user_id = self.await_session(cancel).await?;

        let user = tokio::select! {
            fetched = self.backend.fetch_user(user_id) => fetched
                .map_err(|err| UnauthenticatedReason::UserFetchFailed(format!("{err:#}")))?,
            _ = cancel.cancelled() => return Err(UnauthenticatedReason::Cancelled),
        };

        if user.id != user_id {
            return Err(UnauthenticatedReason::UserMismatch {
                session: user_id,
                record: user.id,
            });
        }

        info!(user_id = user.id.0, admin = user.is_admin(), "session: identity resolved");
        Ok(user)
    }

    async fn await_session(&self, cancel: &mut CancelSignal) -> Result<UserId, UnauthenticatedReason> {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(UnauthenticatedReason::Cancelled);
            }

            let check = tokio::select! {
                check = self.backend.check_session() => check,
                _ = cancel.cancelled() => return Err(UnauthenticatedReason::Cancelled),
            };

            match check {
                Ok(SessionCheck::Established(user_id)) => return Ok(user_id),
                Ok(SessionCheck::Rejected { status }) => {
                    return Err(UnauthenticatedReason::Rejected { status })
                }
                Err(err) => {
                    return Err(UnauthenticatedReason::SessionCheckFailed(format!("{err:#}")))
                }
                Ok(SessionCheck::Pending) => {
                    info!(
                        attempt,
                        max_attempts = attempts,
                        kind = ?FailureKind::TransientAuth,
                        "session: credential not established yet"
                    );
                    if attempt < attempts {
                        tokio::select! {
                            _ = tokio::time::sleep(self.retry.delay) => {}
                            _ = cancel.cancelled() => return Err(UnauthenticatedReason::Cancelled),
                        }
                    }
                }
            }
        }

        Err(UnauthenticatedReason::NotEstablished { attempts })
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
