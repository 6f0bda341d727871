//! Explicit view state for the client and the single authorization policy that
//! decides where an identity lands.

use std::collections::BTreeSet;

use shared::{domain::ParcelId, protocol::UserRecord};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    error::FailureKind,
    profile::{missing_profile_fields, ProfileField},
    session::{Identity, SessionGate},
    ShippingBackend,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DashboardPanel {
    #[default]
    GetQuote,
    CreateOrder,
    ViewOrders,
}

impl DashboardPanel {
    pub const ALL: [DashboardPanel; 3] = [
        DashboardPanel::GetQuote,
        DashboardPanel::CreateOrder,
        DashboardPanel::ViewOrders,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DashboardPanel::GetQuote => "Get a Quote",
            DashboardPanel::CreateOrder => "Create Order",
            DashboardPanel::ViewOrders => "View Orders",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|panel| panel.label().eq_ignore_ascii_case(label.trim()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ViewState {
    #[default]
    Login,
    CompleteProfile { missing: BTreeSet<ProfileField> },
    Dashboard(DashboardPanel),
    AdminOrders,
    AdminManage(ParcelId),
}

impl ViewState {
    pub fn requires_identity(&self) -> bool {
        !matches!(self, ViewState::Login)
    }

    pub fn is_admin_view(&self) -> bool {
        matches!(self, ViewState::AdminOrders | ViewState::AdminManage(_))
    }
}

/// Landing view for a resolved user: administrators go to the order list,
/// users with gaps in their profile are sent to complete it first.
pub fn route_for(user: &UserRecord) -> ViewState {
    if user.is_admin() {
        return ViewState::AdminOrders;
    }

    let missing = missing_profile_fields(user);
    if !missing.is_empty() {
        return ViewState::CompleteProfile { missing };
    }

    ViewState::Dashboard(DashboardPanel::default())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("sign in required")]
    NotAuthenticated,
    #[error("administrator role required")]
    NotAuthorized,
    #[error("profile incomplete: missing {0}")]
    ProfileIncomplete(String),
    #[error("logout failed: {0}")]
    Logout(String),
}

impl NavigationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            NavigationError::NotAuthenticated => FailureKind::AuthFailure,
            NavigationError::NotAuthorized | NavigationError::ProfileIncomplete(_) => {
                FailureKind::Validation
            }
            NavigationError::Logout(_) => FailureKind::RemoteWriteFailure,
        }
    }
}

/// Owns the current view and the identity it was derived from. Consumers read
/// the identity; only this controller replaces it.
#[derive(Debug, Clone, Default)]
pub struct NavigationController {
    view: ViewState,
    identity: Option<UserRecord>,
}

impl NavigationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn identity(&self) -> Option<&UserRecord> {
        self.identity.as_ref()
    }

    pub fn apply_identity(&mut self, identity: Identity) -> &ViewState {
        match identity {
            Identity::Authenticated(user) => {
                self.view = route_for(&user);
                info!(user_id = user.id.0, view = ?self.view, "navigation: landing view selected");
                self.identity = Some(user);
            }
            Identity::Unauthenticated(reason) => {
                info!(%reason, "navigation: redirecting to login");
                self.identity = None;
                self.view = ViewState::Login;
            }
        }
        &self.view
    }

    pub async fn refresh(&mut self, gate: &SessionGate) -> &ViewState {
        let identity = gate.resolve_identity().await;
        self.apply_identity(identity)
    }

    /// Replaces the identity after a profile edit; the landing view is recomputed
    /// from the new record.
    pub fn profile_updated(&mut self, user: UserRecord) -> &ViewState {
        self.apply_identity(Identity::Authenticated(user))
    }

    pub fn select_panel(&mut self, panel: DashboardPanel) -> Result<&ViewState, NavigationError> {
        let user = self
            .identity
            .as_ref()
            .ok_or(NavigationError::NotAuthenticated)?;
        if user.is_admin() {
            return Err(NavigationError::NotAuthorized);
        }

        let missing = missing_profile_fields(user);
        if !missing.is_empty() {
            let fields = missing
                .iter()
                .map(|field| field.label())
                .collect::<Vec<_>>()
                .join(", ");
            self.view = ViewState::CompleteProfile { missing };
            return Err(NavigationError::ProfileIncomplete(fields));
        }

        self.view = ViewState::Dashboard(panel);
        Ok(&self.view)
    }

    pub fn show_admin_orders(&mut self) -> Result<&ViewState, NavigationError> {
        self.require_admin()?;
        self.view = ViewState::AdminOrders;
        Ok(&self.view)
    }

    pub fn manage_parcel(&mut self, parcel_id: ParcelId) -> Result<&ViewState, NavigationError> {
        self.require_admin()?;
        self.view = ViewState::AdminManage(parcel_id);
        Ok(&self.view)
    }

    /// Navigates to a view produced by another component (e.g. after a status
    /// update), applying the same role checks as direct navigation.
    pub fn navigate(&mut self, view: ViewState) -> Result<&ViewState, NavigationError> {
        match view {
            ViewState::Login => {
                self.identity = None;
                self.view = ViewState::Login;
                Ok(&self.view)
            }
            ViewState::AdminOrders => self.show_admin_orders(),
            ViewState::AdminManage(parcel_id) => self.manage_parcel(parcel_id),
            ViewState::Dashboard(panel) => self.select_panel(panel),
            ViewState::CompleteProfile { .. } => {
                let user = self
                    .identity
                    .as_ref()
                    .ok_or(NavigationError::NotAuthenticated)?;
                self.view = ViewState::CompleteProfile {
                    missing: missing_profile_fields(user),
                };
                Ok(&self.view)
            }
        }
    }

    pub async fn logout(&mut self, backend: &dyn ShippingBackend) -> Result<(), NavigationError> {
        if let Err(err) = backend.logout().await {
            let message = format!("{err:#}");
            warn!(error = %message, "navigation: logout failed");
            return Err(NavigationError::Logout(message));
        }
        self.identity = None;
        self.view = ViewState::Login;
        Ok(())
    }

    fn require_admin(&self) -> Result<(), NavigationError> {
        let user = self
            .identity
            .as_ref()
            .ok_or(NavigationError::NotAuthenticated)?;
        if !user.is_admin() {
            return Err(NavigationError::NotAuthorized);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/navigation_tests.rs"]
mod tests;
