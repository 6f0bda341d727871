use shared::{domain::ParcelId, protocol::{ParcelRecord, UserRecord}};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    error::FailureKind,
    route::{ResolvedRoute, RouteResolver},
    ShippingBackend,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParcelListError {
    #[error("could not load parcels: {0}")]
    Fetch(String),
    #[error("could not load parcel {id}: {message}")]
    Lookup { id: ParcelId, message: String },
}

impl ParcelListError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::RemoteReadFailure
    }
}

/// A parcel ready for display. `route` is `None` when no map can be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelView {
    pub parcel: ParcelRecord,
    pub route: Option<ResolvedRoute>,
}

impl ParcelView {
    pub fn has_map(&self) -> bool {
        self.route.is_some()
    }
}

pub async fn list_parcels(
    backend: &dyn ShippingBackend,
    user: &UserRecord,
) -> Result<Vec<ParcelRecord>, ParcelListError> {
    let parcels = backend.list_parcels(user.id).await.map_err(|err| {
        let message = format!("{err:#}");
        warn!(user_id = user.id.0, error = %message, "parcels: listing failed");
        ParcelListError::Fetch(message)
    })?;
    info!(user_id = user.id.0, count = parcels.len(), "parcels: loaded");
    Ok(parcels)
}

pub async fn fetch_parcel(
    backend: &dyn ShippingBackend,
    id: ParcelId,
) -> Result<ParcelRecord, ParcelListError> {
    backend
        .fetch_parcel(id)
        .await
        .map_err(|err| ParcelListError::Lookup {
            id,
            message: format!("{err:#}"),
        })
}

/// Case-insensitive substring match on the tracking number. A blank query
/// keeps everything; parcels without a tracking number only match a blank query.
pub fn filter_by_tracking<'a>(parcels: &'a [ParcelRecord], query: &str) -> Vec<&'a ParcelRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return parcels.iter().collect();
    }
    parcels
        .iter()
        .filter(|parcel| {
            parcel
                .tracking_number
                .as_deref()
                .is_some_and(|tracking| tracking.to_lowercase().contains(&needle))
        })
        .collect()
}

pub async fn parcel_view(resolver: &RouteResolver, parcel: ParcelRecord) -> ParcelView {
    let route = match resolver.resolve_for_parcel(&parcel).await {
        Ok(route) => Some(route),
        Err(err) => {
            warn!(parcel_id = parcel.id.0, error = %err, "parcels: showing parcel without a map");
            None
        }
    };
    ParcelView { parcel, route }
}

/// Routes are looked up one parcel at a time; a failed lookup only drops that
/// parcel's map.
pub async fn load_parcel_views(
    resolver: &RouteResolver,
    parcels: Vec<ParcelRecord>,
) -> Vec<ParcelView> {
    let mut views = Vec::with_capacity(parcels.len());
    for parcel in parcels {
        views.push(parcel_view(resolver, parcel).await);
    }
    views
}

#[cfg(test)]
#[path = "tests/parcels_tests.rs"]
mod tests;
