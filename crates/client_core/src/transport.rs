use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{AddressId, ParcelId, ParcelStatus, RecipientId, UserId},
    error::{ApiError, BackendRejection},
    protocol::{
        CreatedRecord, EmailRequest, LoginRequest, ParcelRecord, ParcelRequest,
        RecipientAddressRequest, RecipientRecord, RecipientRequest, SessionCheckResponse,
        StatusPatch, UserAddressRequest, UserRecord,
    },
};
use tracing::{debug, info};

use crate::{SessionCheck, ShippingBackend};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-backed [`ShippingBackend`]. The cookie store carries the session
/// credential between calls, so one instance represents one signed-in browser.
pub struct HttpBackend {
    http: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .context("failed to build backend http client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn delete(&self, path: String, operation: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&path))
            .send()
            .await
            .with_context(|| format!("{operation} request failed"))?;
        ensure_success(response, operation).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .ok()
        .and_then(|envelope| envelope.text().map(str::to_string))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                trimmed.to_string()
            }
        });

    Err(BackendRejection::new(operation, status.as_u16(), message).into())
}

async fn decode<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
    response
        .json()
        .await
        .with_context(|| format!("invalid payload from {operation}"))
}

// Create endpoints are not consistent about returning the created row.
async fn decode_created(response: Response, operation: &str) -> Result<CreatedRecord> {
    let body = response
        .text()
        .await
        .with_context(|| format!("failed to read response from {operation}"))?;
    if body.trim().is_empty() {
        return Ok(CreatedRecord::default());
    }
    serde_json::from_str(&body).with_context(|| format!("invalid payload from {operation}"))
}

#[async_trait]
impl ShippingBackend for HttpBackend {
    async fn login(&self, email: &str, password: &str) -> Result<UserRecord> {
        let operation = "POST /login";
        let response = self
            .http
            .post(self.url("/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .context("login request failed")?;
        let user: UserRecord = decode(ensure_success(response, operation).await?, operation).await?;
        info!(user_id = user.id.0, "auth: login accepted");
        Ok(user)
    }

    async fn check_session(&self) -> Result<SessionCheck> {
        let response = self
            .http
            .get(self.url("/check_session"))
            .send()
            .await
            .context("session check request failed")?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(SessionCheck::Pending);
        }
        if !status.is_success() {
            return Ok(SessionCheck::Rejected {
                status: status.as_u16(),
            });
        }

        let body: SessionCheckResponse = response
            .json()
            .await
            .context("malformed session payload")?;
        Ok(SessionCheck::Established(body.id))
    }

    async fn fetch_user(&self, user_id: UserId) -> Result<UserRecord> {
        let operation = "GET /users/{id}";
        let response = self
            .http
            .get(self.url(&format!("/users/{}", user_id.0)))
            .send()
            .await
            .with_context(|| format!("failed to fetch user {}", user_id.0))?;
        decode(ensure_success(response, operation).await?, operation).await
    }

    async fn logout(&self) -> Result<()> {
        self.delete("/logout".to_string(), "DELETE /logout").await?;
        info!("auth: logged out");
        Ok(())
    }

    async fn create_user_address(&self, request: &UserAddressRequest) -> Result<CreatedRecord> {
        let operation = "POST /user_addresses";
        let response = self
            .http
            .post(self.url("/user_addresses"))
            .json(request)
            .send()
            .await
            .context("sender address request failed")?;
        decode_created(ensure_success(response, operation).await?, operation).await
    }

    async fn create_recipient(&self, request: &RecipientRequest) -> Result<RecipientRecord> {
        let operation = "POST /recipients";
        let response = self
            .http
            .post(self.url("/recipients"))
            .json(request)
            .send()
            .await
            .context("recipient request failed")?;
        decode(ensure_success(response, operation).await?, operation).await
    }

    async fn create_recipient_address(
        &self,
        request: &RecipientAddressRequest,
    ) -> Result<CreatedRecord> {
        let operation = "POST /recipient_addresses";
        let response = self
            .http
            .post(self.url("/recipient_addresses"))
            .json(request)
            .send()
            .await
            .context("recipient address request failed")?;
        decode_created(ensure_success(response, operation).await?, operation).await
    }

    async fn create_parcel(&self, request: &ParcelRequest) -> Result<ParcelRecord> {
        let operation = "POST /parcels";
        let response = self
            .http
            .post(self.url("/parcels"))
            .json(request)
            .send()
            .await
            .context("parcel request failed")?;
        decode(ensure_success(response, operation).await?, operation).await
    }

    async fn delete_user_address(&self, address_id: AddressId) -> Result<()> {
        self.delete(
            format!("/user_addresses/{}", address_id.0),
            "DELETE /user_addresses/{id}",
        )
        .await
    }

    async fn delete_recipient(&self, recipient_id: RecipientId) -> Result<()> {
        self.delete(
            format!("/recipients/{}", recipient_id.0),
            "DELETE /recipients/{id}",
        )
        .await
    }

    async fn delete_recipient_address(&self, address_id: AddressId) -> Result<()> {
        self.delete(
            format!("/recipient_addresses/{}", address_id.0),
            "DELETE /recipient_addresses/{id}",
        )
        .await
    }

    async fn list_parcels(&self, user_id: UserId) -> Result<Vec<ParcelRecord>> {
        let operation = "GET /parcels";
        let response = self
            .http
            .get(self.url("/parcels"))
            .query(&[("user_id", user_id.0)])
            .send()
            .await
            .with_context(|| format!("failed to list parcels for user {}", user_id.0))?;
        let parcels: Vec<ParcelRecord> =
            decode(ensure_success(response, operation).await?, operation).await?;
        debug!(user_id = user_id.0, count = parcels.len(), "parcels: listed");
        Ok(parcels)
    }

    async fn fetch_parcel(&self, parcel_id: ParcelId) -> Result<ParcelRecord> {
        let operation = "GET /parcels/{id}";
        let response = self
            .http
            .get(self.url(&format!("/parcels/{}", parcel_id.0)))
            .send()
            .await
            .with_context(|| format!("failed to fetch parcel {}", parcel_id.0))?;
        decode(ensure_success(response, operation).await?, operation).await
    }

    async fn update_parcel_status(&self, parcel_id: ParcelId, status: ParcelStatus) -> Result<()> {
        let operation = "PATCH /parcels/{id}";
        let response = self
            .http
            .patch(self.url(&format!("/parcels/{}", parcel_id.0)))
            .json(&StatusPatch { status })
            .send()
            .await
            .with_context(|| format!("status update request failed for parcel {}", parcel_id.0))?;
        ensure_success(response, operation).await?;
        Ok(())
    }

    async fn send_email(&self, email: &EmailRequest) -> Result<()> {
        let operation = "POST /send-email";
        let response = self
            .http
            .post(self.url("/send-email"))
            .json(email)
            .send()
            .await
            .context("notification request failed")?;
        ensure_success(response, operation).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
