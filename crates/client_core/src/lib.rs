use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{AddressId, ParcelId, ParcelStatus, RecipientId, UserId},
    protocol::{
        CreatedRecord, EmailRequest, ParcelRecord, ParcelRequest, RecipientAddressRequest,
        RecipientRecord, RecipientRequest, UserAddressRequest, UserRecord,
    },
};

pub mod config;
pub mod error;
pub mod navigation;
pub mod order;
pub mod parcels;
pub mod profile;
pub mod route;
pub mod session;
pub mod status;
pub mod transport;

pub use error::{ClientError, ErrorContext, FailureKind};
pub use navigation::{route_for, DashboardPanel, NavigationController, ViewState};
pub use order::{
    AddressDraft, OrderStep, OrderWorkflow, ParcelDraft, RecipientDraft, WorkflowError,
};
pub use parcels::{filter_by_tracking, load_parcel_views, ParcelListError, ParcelView};
pub use profile::{missing_profile_fields, ProfileField};
pub use route::{location_label, ResolvedRoute, RouteError, RouteResolver, RouteWatch};
pub use session::{
    cancellation, CancelHandle, CancelSignal, Identity, RetryPolicy, SessionGate,
    UnauthenticatedReason,
};
pub use status::{NotificationOutcome, ParcelStatusController, StatusError, StatusOutcome};
pub use transport::HttpBackend;

/// What `GET /check_session` said about the caller's credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    Established(UserId),
    /// 204: the cookie has not propagated yet.
    Pending,
    Rejected {
        status: u16,
    },
}

/// The REST backend as seen by the client core. Every method is a single remote
/// call; sequencing and retry policy live in the callers.
#[async_trait]
pub trait ShippingBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<UserRecord>;
    async fn check_session(&self) -> Result<SessionCheck>;
    async fn fetch_user(&self, user_id: UserId) -> Result<UserRecord>;
    async fn logout(&self) -> Result<()>;

    async fn create_user_address(&self, request: &UserAddressRequest) -> Result<CreatedRecord>;
    async fn create_recipient(&self, request: &RecipientRequest) -> Result<RecipientRecord>;
    async fn create_recipient_address(
        &self,
        request: &RecipientAddressRequest,
    ) -> Result<CreatedRecord>;
    async fn create_parcel(&self, request: &ParcelRequest) -> Result<ParcelRecord>;

    async fn delete_user_address(&self, address_id: AddressId) -> Result<()>;
    async fn delete_recipient(&self, recipient_id: RecipientId) -> Result<()>;
    async fn delete_recipient_address(&self, address_id: AddressId) -> Result<()>;

    async fn list_parcels(&self, user_id: UserId) -> Result<Vec<ParcelRecord>>;
    async fn fetch_parcel(&self, parcel_id: ParcelId) -> Result<ParcelRecord>;
    async fn update_parcel_status(&self, parcel_id: ParcelId, status: ParcelStatus) -> Result<()>;
    async fn send_email(&self, email: &EmailRequest) -> Result<()>;
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
