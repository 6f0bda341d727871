//! Driving-directions collaborator seam.
//!
//! The client core never talks to a mapping provider directly; it asks a
//! [`DirectionsService`] for a route between two free-text locations and works
//! with the provider-neutral model defined here.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod google;

pub use google::GoogleDirectionsClient;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Axis-aligned box grown one point at a time, mirroring how map viewports are
/// fitted to a path.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatLngBounds {
    corners: Option<(LatLng, LatLng)>,
}

impl LatLngBounds {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, point: LatLng) {
        self.corners = Some(match self.corners {
            None => (point, point),
            Some((south_west, north_east)) => (
                LatLng::new(south_west.lat.min(point.lat), south_west.lng.min(point.lng)),
                LatLng::new(north_east.lat.max(point.lat), north_east.lng.max(point.lng)),
            ),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_none()
    }

    pub fn south_west(&self) -> Option<LatLng> {
        self.corners.map(|(south_west, _)| south_west)
    }

    pub fn north_east(&self) -> Option<LatLng> {
        self.corners.map(|(_, north_east)| north_east)
    }

    pub fn contains(&self, point: LatLng) -> bool {
        self.corners.is_some_and(|(south_west, north_east)| {
            (south_west.lat..=north_east.lat).contains(&point.lat)
                && (south_west.lng..=north_east.lng).contains(&point.lng)
        })
    }

    pub fn center(&self) -> Option<LatLng> {
        self.corners.map(|(south_west, north_east)| {
            LatLng::new(
                (south_west.lat + north_east.lat) / 2.0,
                (south_west.lng + north_east.lng) / 2.0,
            )
        })
    }
}

impl FromIterator<LatLng> for LatLngBounds {
    fn from_iter<I: IntoIterator<Item = LatLng>>(iter: I) -> Self {
        let mut bounds = LatLngBounds::empty();
        for point in iter {
            bounds.extend(point);
        }
        bounds
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Bicycling,
    Transit,
}

impl TravelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
            TravelMode::Transit => "transit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DirectionsStatus {
    Ok,
    NotFound,
    ZeroResults,
    MaxWaypointsExceeded,
    InvalidRequest,
    OverQueryLimit,
    RequestDenied,
    UnknownError,
    Other(String),
}

impl DirectionsStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, DirectionsStatus::Ok)
    }

    pub fn as_str(&self) -> &str {
        match self {
            DirectionsStatus::Ok => "OK",
            DirectionsStatus::NotFound => "NOT_FOUND",
            DirectionsStatus::ZeroResults => "ZERO_RESULTS",
            DirectionsStatus::MaxWaypointsExceeded => "MAX_WAYPOINTS_EXCEEDED",
            DirectionsStatus::InvalidRequest => "INVALID_REQUEST",
            DirectionsStatus::OverQueryLimit => "OVER_QUERY_LIMIT",
            DirectionsStatus::RequestDenied => "REQUEST_DENIED",
            DirectionsStatus::UnknownError => "UNKNOWN_ERROR",
            DirectionsStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for DirectionsStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "OK" => DirectionsStatus::Ok,
            "NOT_FOUND" => DirectionsStatus::NotFound,
            "ZERO_RESULTS" => DirectionsStatus::ZeroResults,
            "MAX_WAYPOINTS_EXCEEDED" => DirectionsStatus::MaxWaypointsExceeded,
            "INVALID_REQUEST" => DirectionsStatus::InvalidRequest,
            "OVER_QUERY_LIMIT" => DirectionsStatus::OverQueryLimit,
            "REQUEST_DENIED" => DirectionsStatus::RequestDenied,
            "UNKNOWN_ERROR" => DirectionsStatus::UnknownError,
            _ => DirectionsStatus::Other(raw),
        }
    }
}

impl From<DirectionsStatus> for String {
    fn from(status: DirectionsStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for DirectionsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionsRequest {
    pub origin: String,
    pub destination: String,
    pub travel_mode: TravelMode,
}

impl DirectionsRequest {
    pub fn driving(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            travel_mode: TravelMode::Driving,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextValue {
    pub text: String,
    #[serde(default)]
    pub value: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub start_location: LatLng,
    pub end_location: LatLng,
    #[serde(default)]
    pub distance: Option<TextValue>,
    #[serde(default)]
    pub duration: Option<TextValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub distance: TextValue,
    pub duration: TextValue,
    pub start_location: LatLng,
    pub end_location: LatLng,
    #[serde(default)]
    pub start_address: Option<String>,
    #[serde(default)]
    pub end_address: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub legs: Vec<Leg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsResponse {
    pub status: DirectionsStatus,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl DirectionsResponse {
    pub fn first_leg(&self) -> Option<&Leg> {
        self.routes.first().and_then(|route| route.legs.first())
    }
}

#[async_trait]
pub trait DirectionsService: Send + Sync {
    /// Transport or decoding failures are errors; a provider that answered with a
    /// non-OK status still yields `Ok` with that status.
    async fn route(&self, request: DirectionsRequest) -> anyhow::Result<DirectionsResponse>;
}

pub struct MissingDirectionsService;

#[async_trait]
impl DirectionsService for MissingDirectionsService {
    async fn route(&self, _request: DirectionsRequest) -> anyhow::Result<DirectionsResponse> {
        Err(anyhow::anyhow!("directions service is unavailable"))
    }
}
