use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::{DirectionsRequest, DirectionsResponse, DirectionsService};

pub const GOOGLE_MAPS_BASE_URL: &str = "https://maps.googleapis.com";
const DIRECTIONS_PATH: &str = "/maps/api/directions/json";

/// Directions client for the Google Directions web service, or any service that
/// speaks the same JSON shape.
#[derive(Clone)]
pub struct GoogleDirectionsClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl fmt::Debug for GoogleDirectionsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleDirectionsClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl GoogleDirectionsClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(GOOGLE_MAPS_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_http_client(Client::new(), base_url, api_key)
    }

    pub fn with_http_client(
        http: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DirectionsService for GoogleDirectionsClient {
    async fn route(&self, request: DirectionsRequest) -> Result<DirectionsResponse> {
        let mut query = vec![
            ("origin", request.origin.as_str()),
            ("destination", request.destination.as_str()),
            ("mode", request.travel_mode.as_str()),
        ];
        if let Some(key) = self.api_key.as_deref() {
            query.push(("key", key));
        }

        let response: DirectionsResponse = self
            .http
            .get(format!("{}{DIRECTIONS_PATH}", self.base_url))
            .query(&query)
            .send()
            .await
            .with_context(|| {
                format!(
                    "directions request failed for '{}' -> '{}'",
                    request.origin, request.destination
                )
            })?
            .error_for_status()?
            .json()
            .await
            .context("invalid directions payload")?;

        debug!(
            origin = %request.origin,
            destination = %request.destination,
            status = %response.status,
            routes = response.routes.len(),
            "directions: lookup finished"
        );

        Ok(response)
    }
}

#[cfg(test)]
#[path = "tests/google_tests.rs"]
mod tests;
