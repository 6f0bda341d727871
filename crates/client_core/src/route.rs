//! Driving route between a parcel's sender and recipient, reduced to what a map
//! view needs: distance, duration, markers and a fitted viewport.

use std::sync::Arc;

use directions::{
    DirectionsRequest, DirectionsService, DirectionsStatus, LatLng, LatLngBounds, Leg, TextValue,
};
use shared::protocol::ParcelRecord;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::FailureKind;

/// Coarse location string sent to the directions provider.
pub fn location_label(city: &str, country: &str) -> String {
    format!("{}, {}", city.trim(), country.trim())
}

fn party_label(
    party: &'static str,
    city: Option<&str>,
    country: Option<&str>,
) -> Result<String, RouteError> {
    fn present(value: Option<&str>) -> Option<&str> {
        value.filter(|v| !v.trim().is_empty())
    }
    match (present(city), present(country)) {
        (Some(city), Some(country)) => Ok(location_label(city, country)),
        _ => Err(RouteError::MissingLocation { party }),
    }
}

/// Origin and destination labels for a parcel, taken from the embedded sender
/// and recipient records.
pub fn parcel_labels(parcel: &ParcelRecord) -> Result<(String, String), RouteError> {
    let origin = party_label(
        "sender",
        parcel.user.as_ref().and_then(|u| u.city.as_deref()),
        parcel.user.as_ref().and_then(|u| u.country.as_deref()),
    )?;
    let destination = party_label(
        "recipient",
        parcel.recipient.as_ref().and_then(|r| r.city.as_deref()),
        parcel.recipient.as_ref().and_then(|r| r.country.as_deref()),
    )?;
    Ok((origin, destination))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no route available ({status})")]
    Unavailable { status: DirectionsStatus },
    #[error("directions lookup failed: {0}")]
    Lookup(String),
    #[error("{party} location is incomplete")]
    MissingLocation { party: &'static str },
}

impl RouteError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::RouteUnavailable
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRoute {
    pub origin: String,
    pub destination: String,
    pub distance: TextValue,
    pub duration: TextValue,
    pub start: LatLng,
    pub end: LatLng,
    /// Leg start followed by the end of every step.
    pub path: Vec<LatLng>,
    pub bounds: LatLngBounds,
    pub center: LatLng,
}

impl ResolvedRoute {
    fn from_leg(origin: String, destination: String, leg: &Leg) -> Self {
        let mut bounds: LatLngBounds = leg
            .steps
            .iter()
            .flat_map(|step| [step.start_location, step.end_location])
            .collect();
        if leg.steps.is_empty() {
            bounds = [leg.start_location, leg.end_location].into_iter().collect();
        }
        let path = std::iter::once(leg.start_location)
            .chain(leg.steps.iter().map(|step| step.end_location))
            .collect();
        let center = bounds.center().unwrap_or(leg.start_location);

        Self {
            origin,
            destination,
            distance: leg.distance.clone(),
            duration: leg.duration.clone(),
            start: leg.start_location,
            end: leg.end_location,
            path,
            bounds,
            center,
        }
    }

    pub fn distance_text(&self) -> &str {
        &self.distance.text
    }

    pub fn duration_text(&self) -> &str {
        &self.duration.text
    }
}

#[derive(Clone)]
pub struct RouteResolver {
    directions: Arc<dyn DirectionsService>,
}

impl RouteResolver {
    pub fn new(directions: Arc<dyn DirectionsService>) -> Self {
        Self { directions }
    }

    pub async fn resolve_route(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<ResolvedRoute, RouteError> {
        let request = DirectionsRequest::driving(origin, destination);
        let response = self.directions.route(request).await.map_err(|err| {
            let message = format!("{err:#}");
            warn!(origin, destination, error = %message, "route: directions request failed");
            RouteError::Lookup(message)
        })?;

        if !response.status.is_ok() {
            warn!(
                origin,
                destination,
                status = %response.status,
                detail = response.error_message.as_deref().unwrap_or(""),
                "route: directions unavailable"
            );
            return Err(RouteError::Unavailable {
                status: response.status,
            });
        }

        let Some(leg) = response.first_leg() else {
            warn!(origin, destination, "route: provider returned no legs");
            return Err(RouteError::Unavailable {
                status: response.status.clone(),
            });
        };

        let route = ResolvedRoute::from_leg(origin.to_string(), destination.to_string(), leg);
        debug!(
            origin,
            destination,
            distance = %route.distance.text,
            duration = %route.duration.text,
            "route: resolved"
        );
        Ok(route)
    }

    pub async fn resolve_for_parcel(
        &self,
        parcel: &ParcelRecord,
    ) -> Result<ResolvedRoute, RouteError> {
        let (origin, destination) = parcel_labels(parcel)?;
        self.resolve_route(&origin, &destination).await
    }
}

/// Keeps the route for a displayed parcel and only asks the provider again
/// when the origin or destination label changes.
#[derive(Debug, Default)]
pub struct RouteWatch {
    entry: Option<WatchedRoute>,
}

#[derive(Debug)]
struct WatchedRoute {
    origin: String,
    destination: String,
    result: Result<ResolvedRoute, RouteError>,
}

impl RouteWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(
        &mut self,
        resolver: &RouteResolver,
        origin: &str,
        destination: &str,
    ) -> Result<&ResolvedRoute, &RouteError> {
        let entry = match self.entry.take() {
            Some(entry) if entry.origin == origin && entry.destination == destination => entry,
            _ => WatchedRoute {
                origin: origin.to_string(),
                destination: destination.to_string(),
                result: resolver.resolve_route(origin, destination).await,
            },
        };
        self.entry.insert(entry).result.as_ref()
    }

    pub fn current(&self) -> Option<&ResolvedRoute> {
        self.entry
            .as_ref()
            .and_then(|entry| entry.result.as_ref().ok())
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
#[path = "tests/route_tests.rs"]
mod tests;
