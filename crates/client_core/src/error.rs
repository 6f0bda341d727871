//! Failure taxonomy shared by every component, and the front-end facing error
//! wrapper built from it.

use thiserror::Error;

use crate::{
    navigation::NavigationError, order::WorkflowError, parcels::ParcelListError, route::RouteError,
    session::UnauthenticatedReason, status::StatusError,
};

/// How a failure resolves for the user. None of these are fatal to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Session not established yet; retried automatically.
    TransientAuth,
    /// Terminal; the caller redirects to the login view.
    AuthFailure,
    /// Rejected before any remote call; shown inline.
    Validation,
    /// A backend write failed; the step can be resubmitted.
    RemoteWriteFailure,
    /// A backend read failed; the view shows an inline error.
    RemoteReadFailure,
    /// Mapping collaborator failed; the map is omitted.
    RouteUnavailable,
    /// Best-effort notification failed after an authoritative change.
    NotificationFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    Session,
    Login,
    Logout,
    Navigation,
    CreateOrder,
    ParcelListing,
    RouteLookup,
    StatusUpdate,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?} during {context:?}: {message}")]
pub struct ClientError {
    kind: FailureKind,
    context: ErrorContext,
    message: String,
}

impl ClientError {
    pub fn new(kind: FailureKind, context: ErrorContext, message: impl Into<String>) -> Self {
        Self {
            kind,
            context,
            message: message.into(),
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.kind == FailureKind::AuthFailure
    }

    /// Whether the user can fix this by editing input or resubmitting.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::Validation | FailureKind::RemoteWriteFailure
        )
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn context(&self) -> ErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<UnauthenticatedReason> for ClientError {
    fn from(reason: UnauthenticatedReason) -> Self {
        Self::new(reason.kind(), ErrorContext::Session, reason.to_string())
    }
}

impl From<WorkflowError> for ClientError {
    fn from(err: WorkflowError) -> Self {
        Self::new(err.kind(), ErrorContext::CreateOrder, err.to_string())
    }
}

impl From<RouteError> for ClientError {
    fn from(err: RouteError) -> Self {
        Self::new(err.kind(), ErrorContext::RouteLookup, err.to_string())
    }
}

impl From<StatusError> for ClientError {
    fn from(err: StatusError) -> Self {
        Self::new(err.kind(), ErrorContext::StatusUpdate, err.to_string())
    }
}

impl From<ParcelListError> for ClientError {
    fn from(err: ParcelListError) -> Self {
        Self::new(err.kind(), ErrorContext::ParcelListing, err.to_string())
    }
}

impl From<NavigationError> for ClientError {
    fn from(err: NavigationError) -> Self {
        Self::new(err.kind(), ErrorContext::Navigation, err.to_string())
    }
}

/// Turns a raw request failure into a hint a person can act on.
pub fn describe_request_failure(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("failed to connect")
        || lower.contains("connection refused")
        || lower.contains("dns")
        || lower.contains("timed out")
    {
        "Server unreachable; check the backend URL/network and retry.".to_string()
    } else if lower.contains("status 401") || lower.contains("unauthorized") {
        "Invalid email or password.".to_string()
    } else {
        format!("Request failed: {message}")
    }
}
