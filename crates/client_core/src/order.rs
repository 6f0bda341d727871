//! Multi-step "create shipment" wizard.
//!
//! Four dependent backend writes are sequenced into one logical order:
//! sender address, recipient, recipient address, parcel. The machine only
//! advances when the current step's write is acknowledged, and keeps the
//! entered draft when it is not so the same step can be resubmitted.
//!
//! There is no server-side transaction. Records written by earlier steps are
//! tracked in a compensation log, and [`OrderWorkflow::abandon`] deletes them in
//! reverse order when the user gives up on the order.

use std::{fmt, future::Future, mem, sync::Arc};

use shared::{
    domain::{AddressId, ParcelStatus, RecipientId, UserId},
    error::BackendRejection,
    protocol::{
        AddressPayload, ParcelRecord, ParcelRequest, RecipientAddressRequest, RecipientRequest,
        UserAddressRequest, UserRecord,
    },
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{error::FailureKind, ShippingBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrderStep {
    SenderAddress,
    RecipientInfo,
    RecipientAddress,
    ParcelDetails,
    Complete,
}

impl OrderStep {
    pub fn number(self) -> u8 {
        match self {
            OrderStep::SenderAddress => 1,
            OrderStep::RecipientInfo => 2,
            OrderStep::RecipientAddress => 3,
            OrderStep::ParcelDetails => 4,
            OrderStep::Complete => 5,
        }
    }

    pub fn next(self) -> Self {
        match self {
            OrderStep::SenderAddress => OrderStep::RecipientInfo,
            OrderStep::RecipientInfo => OrderStep::RecipientAddress,
            OrderStep::RecipientAddress => OrderStep::ParcelDetails,
            OrderStep::ParcelDetails | OrderStep::Complete => OrderStep::Complete,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == OrderStep::Complete
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStep::SenderAddress => "sender address",
            OrderStep::RecipientInfo => "recipient information",
            OrderStep::RecipientAddress => "recipient address",
            OrderStep::ParcelDetails => "parcel details",
            OrderStep::Complete => "complete",
        }
    }
}

impl fmt::Display for OrderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("no signed-in user; the sender address cannot be submitted")]
    MissingIdentity,
    #[error("order is at the {current} step, not {submitted}")]
    OutOfOrder {
        current: OrderStep,
        submitted: OrderStep,
    },
    #[error("order is already complete")]
    AlreadyComplete,
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("{step} submission failed: {message}")]
    RemoteWrite { step: OrderStep, message: String },
    #[error("no recipient recorded for this order")]
    MissingRecipient,
}

impl WorkflowError {
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkflowError::MissingIdentity => FailureKind::AuthFailure,
            WorkflowError::RemoteWrite { .. } => FailureKind::RemoteWriteFailure,
            WorkflowError::OutOfOrder { .. }
            | WorkflowError::AlreadyComplete
            | WorkflowError::Validation { .. }
            | WorkflowError::MissingRecipient => FailureKind::Validation,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> WorkflowError {
    WorkflowError::Validation {
        field,
        reason: reason.into(),
    }
}

fn required(field: &'static str, value: &str) -> Result<String, WorkflowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(field, "is required"));
    }
    Ok(trimmed.to_string())
}

fn optional_coordinate(
    field: &'static str,
    value: &str,
    limit: f64,
) -> Result<Option<f64>, WorkflowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let parsed = parse_number(field, trimmed)?;
    if parsed.abs() > limit {
        return Err(invalid(field, format!("must be within ±{limit}")));
    }
    Ok(Some(parsed))
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, WorkflowError> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|_| invalid(field, format!("'{}' is not a number", value.trim())))?;
    if !parsed.is_finite() {
        return Err(invalid(field, "must be a finite number"));
    }
    Ok(parsed)
}

/// Raw address form input. Latitude and longitude may be left blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressDraft {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub latitude: String,
    pub longitude: String,
}

impl AddressDraft {
    pub fn to_payload(&self) -> Result<AddressPayload, WorkflowError> {
        Ok(AddressPayload {
            street: self.street.trim().to_string(),
            city: required("city", &self.city)?,
            state: self.state.trim().to_string(),
            zip_code: self.zip_code.trim().to_string(),
            country: required("country", &self.country)?,
            latitude: optional_coordinate("latitude", &self.latitude, 90.0)?,
            longitude: optional_coordinate("longitude", &self.longitude, 180.0)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientDraft {
    pub full_name: String,
    pub phone_number: String,
}

impl RecipientDraft {
    pub fn to_request(&self) -> Result<RecipientRequest, WorkflowError> {
        Ok(RecipientRequest {
            recipient_full_name: required("recipient full name", &self.full_name)?,
            phone_number: required("phone number", &self.phone_number)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParcelDraft {
    pub length: String,
    pub width: String,
    pub height: String,
    pub weight: String,
    pub cost: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParcelMeasurements {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    pub cost: f64,
}

impl ParcelDraft {
    pub fn parse(&self) -> Result<ParcelMeasurements, WorkflowError> {
        Ok(ParcelMeasurements {
            length: parse_number("length", &self.length)?,
            width: parse_number("width", &self.width)?,
            height: parse_number("height", &self.height)?,
            weight: parse_number("weight", &self.weight)?,
            cost: parse_number("cost", &self.cost)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationTarget {
    RecipientAddress(AddressId),
    Recipient(RecipientId),
    SenderAddress(AddressId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationResult {
    pub target: CompensationTarget,
    pub outcome: Result<(), String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationReport {
    pub results: Vec<CompensationResult>,
    /// Steps that were written but whose record id the backend never returned.
    pub untracked: Vec<OrderStep>,
}

impl CompensationReport {
    pub fn is_clean(&self) -> bool {
        self.untracked.is_empty() && self.results.iter().all(|r| r.outcome.is_ok())
    }
}

#[derive(Debug, Clone, Default)]
struct CompensationLog {
    sender_address: Option<AddressId>,
    recipient: Option<RecipientId>,
    recipient_address: Option<AddressId>,
    untracked: Vec<OrderStep>,
}

impl CompensationLog {
    fn record_address(&mut self, step: OrderStep, id: Option<i64>) {
        let slot = match step {
            OrderStep::SenderAddress => &mut self.sender_address,
            _ => &mut self.recipient_address,
        };
        match id {
            Some(id) => *slot = Some(AddressId(id)),
            None => self.untracked.push(step),
        }
    }

    // Reverse creation order.
    fn targets(&self) -> Vec<CompensationTarget> {
        let mut targets = Vec::new();
        if let Some(id) = self.recipient_address {
            targets.push(CompensationTarget::RecipientAddress(id));
        }
        if let Some(id) = self.recipient {
            targets.push(CompensationTarget::Recipient(id));
        }
        if let Some(id) = self.sender_address {
            targets.push(CompensationTarget::SenderAddress(id));
        }
        targets
    }
}

fn remote_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<BackendRejection>() {
        Some(rejection) => rejection.message.clone(),
        None => format!("{err:#}"),
    }
}

pub struct OrderWorkflow {
    backend: Arc<dyn ShippingBackend>,
    user_id: Option<UserId>,
    step: OrderStep,
    sender: AddressDraft,
    recipient: RecipientDraft,
    recipient_address: AddressDraft,
    parcel: ParcelDraft,
    recipient_id: Option<RecipientId>,
    created_parcel: Option<ParcelRecord>,
    log: CompensationLog,
    last_error: Option<WorkflowError>,
    submitting: bool,
}

impl OrderWorkflow {
    pub fn new(backend: Arc<dyn ShippingBackend>, user: Option<&UserRecord>) -> Self {
        Self {
            backend,
            user_id: user.map(|user| user.id),
            step: OrderStep::SenderAddress,
            sender: AddressDraft::default(),
            recipient: RecipientDraft::default(),
            recipient_address: AddressDraft::default(),
            parcel: ParcelDraft::default(),
            recipient_id: None,
            created_parcel: None,
            log: CompensationLog::default(),
            last_error: None,
            submitting: false,
        }
    }

    /// Session resolution may finish after the wizard opened. The first
    /// identity wins; an order never changes owner halfway through.
    pub fn attach_identity(&mut self, user: &UserRecord) {
        if self.user_id.is_none() {
            self.user_id = Some(user.id);
        }
    }

    pub fn step(&self) -> OrderStep {
        self.step
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn recipient_id(&self) -> Option<RecipientId> {
        self.recipient_id
    }

    pub fn created_parcel(&self) -> Option<&ParcelRecord> {
        self.created_parcel.as_ref()
    }

    pub fn last_error(&self) -> Option<&WorkflowError> {
        self.last_error.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn sender_draft(&self) -> &AddressDraft {
        &self.sender
    }

    pub fn recipient_draft(&self) -> &RecipientDraft {
        &self.recipient
    }

    pub fn recipient_address_draft(&self) -> &AddressDraft {
        &self.recipient_address
    }

    pub fn parcel_draft(&self) -> &ParcelDraft {
        &self.parcel
    }

    pub async fn submit_sender_address(
        &mut self,
        draft: AddressDraft,
    ) -> Result<OrderStep, WorkflowError> {
        let step = OrderStep::SenderAddress;
        self.expect_step(step)?;
        self.sender = draft;

        let user_id = self
            .user_id
            .ok_or(WorkflowError::MissingIdentity)
            .map_err(|err| self.fail(err))?;
        let address = self.sender.to_payload().map_err(|err| self.fail(err))?;
        let request = UserAddressRequest { address, user_id };

        let backend = Arc::clone(&self.backend);
        let created = self
            .run_write(step, async move { backend.create_user_address(&request).await })
            .await?;

        self.log.record_address(step, created.id);
        Ok(self.advance())
    }

    pub async fn submit_recipient(
        &mut self,
        draft: RecipientDraft,
    ) -> Result<OrderStep, WorkflowError> {
        let step = OrderStep::RecipientInfo;
        self.expect_step(step)?;
        self.recipient = draft;

        let request = self.recipient.to_request().map_err(|err| self.fail(err))?;
        let backend = Arc::clone(&self.backend);
        let created = self
            .run_write(step, async move { backend.create_recipient(&request).await })
            .await?;

        self.recipient_id = Some(created.id);
        self.log.recipient = Some(created.id);
        Ok(self.advance())
    }

    pub async fn submit_recipient_address(
        &mut self,
        draft: AddressDraft,
    ) -> Result<OrderStep, WorkflowError> {
        let step = OrderStep::RecipientAddress;
        self.expect_step(step)?;
        self.recipient_address = draft;

        let recipient_id = self
            .recipient_id
            .ok_or(WorkflowError::MissingRecipient)
            .map_err(|err| self.fail(err))?;
        let address = self
            .recipient_address
            .to_payload()
            .map_err(|err| self.fail(err))?;
        let request = RecipientAddressRequest {
            address,
            recipient_id,
        };

        let backend = Arc::clone(&self.backend);
        let created = self
            .run_write(step, async move {
                backend.create_recipient_address(&request).await
            })
            .await?;

        self.log.record_address(step, created.id);
        Ok(self.advance())
    }

    pub async fn submit_parcel(&mut self, draft: ParcelDraft) -> Result<OrderStep, WorkflowError> {
        let step = OrderStep::ParcelDetails;
        self.expect_step(step)?;
        self.parcel = draft;

        let measurements = self.parcel.parse().map_err(|err| self.fail(err))?;
        let user_id = self
            .user_id
            .ok_or(WorkflowError::MissingIdentity)
            .map_err(|err| self.fail(err))?;
        let recipient_id = self
            .recipient_id
            .ok_or(WorkflowError::MissingRecipient)
            .map_err(|err| self.fail(err))?;

        let request = ParcelRequest {
            user_id,
            recipient_id,
            length: measurements.length,
            width: measurements.width,
            height: measurements.height,
            weight: measurements.weight,
            cost: measurements.cost,
            status: ParcelStatus::Pending,
        };

        let backend = Arc::clone(&self.backend);
        let parcel = self
            .run_write(step, async move { backend.create_parcel(&request).await })
            .await?;

        if parcel.recipient_ref().is_some_and(|id| id != recipient_id) {
            warn!(
                parcel_id = parcel.id.0,
                expected_recipient = recipient_id.0,
                "order: backend echoed a different recipient for the new parcel"
            );
        }
        info!(
            parcel_id = parcel.id.0,
            user_id = user_id.0,
            recipient_id = recipient_id.0,
            "order: parcel created"
        );
        self.created_parcel = Some(parcel);
        Ok(self.advance())
    }

    /// Deletes whatever earlier steps created, newest first, and resets the
    /// wizard. Individual delete failures are reported, not raised.
    pub async fn abandon(&mut self) -> Result<CompensationReport, WorkflowError> {
        if self.step.is_terminal() {
            return Err(WorkflowError::AlreadyComplete);
        }

        let log = mem::take(&mut self.log);
        let mut report = CompensationReport {
            results: Vec::new(),
            untracked: log.untracked.clone(),
        };

        for target in log.targets() {
            let outcome = match target {
                CompensationTarget::RecipientAddress(id) => {
                    self.backend.delete_recipient_address(id).await
                }
                CompensationTarget::Recipient(id) => self.backend.delete_recipient(id).await,
                CompensationTarget::SenderAddress(id) => self.backend.delete_user_address(id).await,
            }
            .map_err(|err| format!("{err:#}"));

            if let Err(message) = &outcome {
                warn!(?target, error = %message, "order: compensation failed");
            }
            report.results.push(CompensationResult { target, outcome });
        }

        if !report.untracked.is_empty() {
            warn!(steps = ?report.untracked, "order: abandoned records without ids remain on the backend");
        }
        info!(
            compensated = report.results.len(),
            clean = report.is_clean(),
            "order: abandoned"
        );

        self.step = OrderStep::SenderAddress;
        self.recipient_id = None;
        self.last_error = None;
        Ok(report)
    }

    fn expect_step(&mut self, submitted: OrderStep) -> Result<(), WorkflowError> {
        if self.step.is_terminal() {
            return Err(WorkflowError::AlreadyComplete);
        }
        if self.step != submitted {
            return Err(WorkflowError::OutOfOrder {
                current: self.step,
                submitted,
            });
        }
        self.last_error = None;
        Ok(())
    }

    fn fail(&mut self, err: WorkflowError) -> WorkflowError {
        self.last_error = Some(err.clone());
        err
    }

    fn advance(&mut self) -> OrderStep {
        let from = self.step;
        self.step = from.next();
        info!(from = %from, to = %self.step, "order: step acknowledged");
        self.step
    }

    async fn run_write<T, F>(&mut self, step: OrderStep, write: F) -> Result<T, WorkflowError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let result = {
            let _submitting = SubmittingFlag::raise(&mut self.submitting);
            write.await
        };

        result.map_err(|err| {
            let message = remote_message(&err);
            warn!(step = %step, error = %format!("{err:#}"), "order: step write failed");
            self.fail(WorkflowError::RemoteWrite { step, message })
        })
    }
}

/// Lowers the in-flight flag when the write finishes or its future is dropped.
struct SubmittingFlag<'a>(&'a mut bool);

impl<'a> SubmittingFlag<'a> {
    fn raise(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for SubmittingFlag<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

#[cfg(test)]
#[path = "tests/order_tests.rs"]
mod tests;
