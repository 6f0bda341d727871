//! Administrative status changes. The PATCH is authoritative; the e-mail that
//! follows is best effort and never undoes it.

use std::sync::Arc;

use shared::{
    domain::{ParcelId, ParcelStatus, UserId},
    protocol::{EmailRequest, ParcelRecord, UserRecord},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    error::{ClientError, ErrorContext, FailureKind},
    navigation::ViewState,
    ShippingBackend,
};

/// Statuses an administrator may move a parcel to. `Pending` is only ever set
/// on creation.
pub const STATUS_TRANSITION_TARGETS: [ParcelStatus; 3] = [
    ParcelStatus::Accepted,
    ParcelStatus::OutForDelivery,
    ParcelStatus::Delivered,
];

pub const NOTIFICATION_SUBJECT: &str = "Parcel Status Update";

/// Exact label match; "out for delivery" is not accepted.
pub fn parse_transition_target(label: &str) -> Result<ParcelStatus, StatusError> {
    STATUS_TRANSITION_TARGETS
        .into_iter()
        .find(|status| status.label() == label)
        .ok_or_else(|| StatusError::InvalidStatus(label.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("'{0}' is not a status a parcel can be moved to")]
    InvalidStatus(String),
    #[error("user {0} is not allowed to change parcel status")]
    NotAuthorized(UserId),
    #[error("could not load parcel {id}: {message}")]
    ParcelLookup { id: ParcelId, message: String },
    #[error("status update for parcel {id} failed: {message}")]
    Update { id: ParcelId, message: String },
}

impl StatusError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StatusError::InvalidStatus(_) | StatusError::NotAuthorized(_) => FailureKind::Validation,
            StatusError::ParcelLookup { .. } => FailureKind::RemoteReadFailure,
            StatusError::Update { .. } => FailureKind::RemoteWriteFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOutcome {
    pub parcel_id: ParcelId,
    pub status: ParcelStatus,
    pub notification: NotificationOutcome,
}

impl StatusOutcome {
    /// Back to the order list once everyone was told; otherwise stay on the
    /// parcel so the admin sees the notification problem.
    pub fn next_view(&self) -> ViewState {
        match self.notification {
            NotificationOutcome::Sent => ViewState::AdminOrders,
            NotificationOutcome::Failed(_) => ViewState::AdminManage(self.parcel_id),
        }
    }

    pub fn notification_failure(&self) -> Option<ClientError> {
        match &self.notification {
            NotificationOutcome::Sent => None,
            NotificationOutcome::Failed(reason) => Some(ClientError::new(
                FailureKind::NotificationFailure,
                ErrorContext::StatusUpdate,
                format!(
                    "parcel {} is now {}, but the notification was not sent: {reason}",
                    self.parcel_id, self.status
                ),
            )),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// The status e-mail for both parties. Missing addresses are left out; `None`
/// when neither party has one.
pub fn status_notification(parcel: &ParcelRecord, status: ParcelStatus) -> Option<EmailRequest> {
    let sender = parcel.user.as_ref();
    let recipient = parcel.recipient.as_ref();

    let to: Vec<String> = [
        non_blank(sender.and_then(|user| user.email.as_deref())),
        non_blank(recipient.and_then(|r| r.email.as_deref())),
    ]
    .into_iter()
    .flatten()
    .map(str::to_string)
    .collect();
    if to.is_empty() {
        return None;
    }

    let sender_name = sender
        .map(UserRecord::full_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "customer".to_string());
    let recipient_name = recipient.map_or("recipient", |r| r.display_name());

    Some(EmailRequest {
        to,
        subject: NOTIFICATION_SUBJECT.to_string(),
        body: format!(
            "Dear {sender_name}, the status of your parcel to {recipient_name} is now {status}."
        ),
    })
}

pub struct ParcelStatusController {
    backend: Arc<dyn ShippingBackend>,
    actor: UserId,
}

impl ParcelStatusController {
    pub fn new(backend: Arc<dyn ShippingBackend>, actor: &UserRecord) -> Result<Self, StatusError> {
        if !actor.is_admin() {
            return Err(StatusError::NotAuthorized(actor.id));
        }
        Ok(Self {
            backend,
            actor: actor.id,
        })
    }

    pub async fn set_status(
        &self,
        parcel_id: ParcelId,
        new_status: &str,
    ) -> Result<StatusOutcome, StatusError> {
        let status = parse_transition_target(new_status)?;

        let parcel = self
            .backend
            .fetch_parcel(parcel_id)
            .await
            .map_err(|err| StatusError::ParcelLookup {
                id: parcel_id,
                message: format!("{err:#}"),
            })?;

        self.backend
            .update_parcel_status(parcel_id, status)
            .await
            .map_err(|err| {
                let message = format!("{err:#}");
                warn!(parcel_id = parcel_id.0, %status, error = %message, "status: update rejected");
                StatusError::Update {
                    id: parcel_id,
                    message,
                }
            })?;
        info!(
            parcel_id = parcel_id.0,
            actor = self.actor.0,
            from = %parcel.status,
            to = %status,
            "status: parcel updated"
        );

        let notification = self.notify(&parcel, status).await;
        Ok(StatusOutcome {
            parcel_id,
            status,
            notification,
        })
    }

    async fn notify(&self, parcel: &ParcelRecord, status: ParcelStatus) -> NotificationOutcome {
        let Some(email) = status_notification(parcel, status) else {
            warn!(parcel_id = parcel.id.0, kind = ?FailureKind::NotificationFailure, "status: no e-mail address on file");
            return NotificationOutcome::Failed("no e-mail address on file".to_string());
        };

        match self.backend.send_email(&email).await {
            Ok(()) => {
                info!(parcel_id = parcel.id.0, recipients = email.to.len(), "status: notification sent");
                NotificationOutcome::Sent
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(
                    parcel_id = parcel.id.0,
                    kind = ?FailureKind::NotificationFailure,
                    error = %reason,
                    "status: notification failed; status change kept"
                );
                NotificationOutcome::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/status_tests.rs"]
mod tests;
