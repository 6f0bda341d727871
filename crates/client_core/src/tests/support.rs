use std::collections::{HashMap, VecDeque};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use directions::{
    DirectionsRequest, DirectionsResponse, DirectionsService, DirectionsStatus, LatLng, Leg,
    Route, Step, TextValue,
};
use shared::{
    domain::{AddressId, ParcelId, ParcelStatus, RecipientId, UserId, ADMIN_ROLE, USER_ROLE},
    error::BackendRejection,
    protocol::{
        CreatedRecord, EmailRequest, ParcelRecord, ParcelRequest, RecipientAddressRequest,
        RecipientRecord, RecipientRequest, UserAddressRequest, UserRecord,
    },
};
use tokio::sync::{Mutex, MutexGuard};

use crate::{SessionCheck, ShippingBackend};

pub(crate) fn user(id: i64) -> UserRecord {
    UserRecord {
        id: UserId(id),
        first_name: "Wanjiru".into(),
        last_name: "Kamau".into(),
        email: Some("wanjiru@example.com".into()),
        phone_number: Some("+254711000000".into()),
        street: Some("Kenyatta Avenue".into()),
        city: Some("Nairobi".into()),
        state: Some("Nairobi County".into()),
        zip_code: Some("00100".into()),
        country: Some("Kenya".into()),
        roles: vec![USER_ROLE.into()],
    }
}

pub(crate) fn admin(id: i64) -> UserRecord {
    UserRecord {
        first_name: "Otieno".into(),
        last_name: "Admin".into(),
        email: Some("ops@example.com".into()),
        roles: vec![ADMIN_ROLE.into()],
        ..user(id)
    }
}

pub(crate) fn recipient(id: i64) -> RecipientRecord {
    RecipientRecord {
        id: RecipientId(id),
        recipient_full_name: Some("Baraka Omondi".into()),
        phone_number: Some("+254722000000".into()),
        email: Some("baraka@example.com".into()),
        street: Some("Nkrumah Road".into()),
        city: Some("Mombasa".into()),
        state: Some("Mombasa County".into()),
        zip_code: Some("80100".into()),
        country: Some("Kenya".into()),
    }
}

/// A parcel as `GET /parcels/{id}` returns it: both parties embedded.
pub(crate) fn shipped_parcel(id: i64) -> ParcelRecord {
    ParcelRecord {
        id: ParcelId(id),
        user_id: Some(UserId(4)),
        recipient_id: Some(RecipientId(7)),
        length: 30.0,
        width: 20.0,
        height: 10.0,
        weight: 2.5,
        cost: Some(1200.0),
        status: ParcelStatus::Pending,
        tracking_number: Some(format!("SND{id:05}")),
        created_at: None,
        user: Some(user(4)),
        recipient: Some(recipient(7)),
    }
}

/// In-memory backend that records every call as `"METHOD /path"`.
pub(crate) struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, String>>,
    session_script: Mutex<VecDeque<SessionCheck>>,
    users: Mutex<HashMap<UserId, UserRecord>>,
    parcels: Mutex<HashMap<ParcelId, ParcelRecord>>,
    parcel_requests: Mutex<Vec<ParcelRequest>>,
    emails: Mutex<Vec<EmailRequest>>,
    next_id: Mutex<i64>,
    return_created_ids: bool,
}

impl RecordingBackend {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            session_script: Mutex::new(VecDeque::new()),
            users: Mutex::new(HashMap::new()),
            parcels: Mutex::new(HashMap::new()),
            parcel_requests: Mutex::new(Vec::new()),
            emails: Mutex::new(Vec::new()),
            next_id: Mutex::new(100),
            return_created_ids: true,
        }
    }

    pub(crate) fn with_user(mut self, user: UserRecord) -> Self {
        self.users.get_mut().insert(user.id, user);
        self
    }

    pub(crate) fn with_parcel(mut self, parcel: ParcelRecord) -> Self {
        self.parcels.get_mut().insert(parcel.id, parcel);
        self
    }

    pub(crate) fn with_session_script(mut self, checks: impl IntoIterator<Item = SessionCheck>) -> Self {
        self.session_script.get_mut().extend(checks);
        self
    }

    /// Address endpoints answer with an empty body.
    pub(crate) fn without_created_ids(mut self) -> Self {
        self.return_created_ids = false;
        self
    }

    /// Makes every call to `operation` (e.g. `"POST /recipients"`) fail with a 422.
    pub(crate) fn failing(mut self, operation: &'static str, message: &str) -> Self {
        self.failures.get_mut().insert(operation, message.to_string());
        self
    }

    pub(crate) async fn recover(&self, operation: &'static str) {
        self.failures.lock().await.remove(operation);
    }

    /// Holds the call log so every backend call blocks until the guard drops.
    pub(crate) async fn stall(&self) -> MutexGuard<'_, Vec<String>> {
        self.calls.lock().await
    }

    pub(crate) async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub(crate) async fn emails(&self) -> Vec<EmailRequest> {
        self.emails.lock().await.clone()
    }

    pub(crate) async fn parcel_requests(&self) -> Vec<ParcelRequest> {
        self.parcel_requests.lock().await.clone()
    }

    pub(crate) async fn parcel(&self, id: ParcelId) -> Option<ParcelRecord> {
        self.parcels.lock().await.get(&id).cloned()
    }

    async fn record(&self, operation: &'static str, call: String) -> Result<()> {
        self.calls.lock().await.push(call);
        match self.failures.lock().await.get(operation) {
            Some(message) => Err(BackendRejection::new(operation, 422, message.clone()).into()),
            None => Ok(()),
        }
    }

    async fn allocate_id(&self) -> i64 {
        let mut next = self.next_id.lock().await;
        *next += 1;
        *next
    }

    async fn created(&self) -> CreatedRecord {
        if !self.return_created_ids {
            return CreatedRecord::default();
        }
        CreatedRecord {
            id: Some(self.allocate_id().await),
        }
    }
}

#[async_trait]
impl ShippingBackend for RecordingBackend {
    async fn login(&self, email: &str, _password: &str) -> Result<UserRecord> {
        self.record("POST /login", "POST /login".into()).await?;
        self.users
            .lock()
            .await
            .values()
            .find(|user| user.email.as_deref() == Some(email))
            .cloned()
            .ok_or_else(|| anyhow!(BackendRejection::new("POST /login", 401, "Invalid credentials")))
    }

    async fn check_session(&self) -> Result<SessionCheck> {
        self.record("GET /check_session", "GET /check_session".into())
            .await?;
        Ok(self
            .session_script
            .lock()
            .await
            .pop_front()
            .unwrap_or(SessionCheck::Rejected { status: 401 }))
    }

    async fn fetch_user(&self, user_id: UserId) -> Result<UserRecord> {
        self.record("GET /users/{id}", format!("GET /users/{user_id}"))
            .await?;
        self.users
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| anyhow!(BackendRejection::new("GET /users/{id}", 404, "User not found")))
    }

    async fn logout(&self) -> Result<()> {
        self.record("DELETE /logout", "DELETE /logout".into()).await
    }

    async fn create_user_address(&self, _request: &UserAddressRequest) -> Result<CreatedRecord> {
        self.record("POST /user_addresses", "POST /user_addresses".into())
            .await?;
        Ok(self.created().await)
    }

    async fn create_recipient(&self, request: &RecipientRequest) -> Result<RecipientRecord> {
        self.record("POST /recipients", "POST /recipients".into())
            .await?;
        let id = self.allocate_id().await;
        Ok(RecipientRecord {
            id: RecipientId(id),
            recipient_full_name: Some(request.recipient_full_name.clone()),
            phone_number: Some(request.phone_number.clone()),
            email: None,
            street: None,
            city: None,
            state: None,
            zip_code: None,
            country: None,
        })
    }

    async fn create_recipient_address(
        &self,
        _request: &RecipientAddressRequest,
    ) -> Result<CreatedRecord> {
        self.record("POST /recipient_addresses", "POST /recipient_addresses".into())
            .await?;
        Ok(self.created().await)
    }

    async fn create_parcel(&self, request: &ParcelRequest) -> Result<ParcelRecord> {
        self.record("POST /parcels", "POST /parcels".into()).await?;
        self.parcel_requests.lock().await.push(request.clone());
        let id = ParcelId(self.allocate_id().await);
        let parcel = ParcelRecord {
            id,
            user_id: Some(request.user_id),
            recipient_id: Some(request.recipient_id),
            length: request.length,
            width: request.width,
            height: request.height,
            weight: request.weight,
            cost: Some(request.cost),
            status: request.status,
            tracking_number: Some(format!("SND{:05}", id.0)),
            created_at: None,
            user: None,
            recipient: None,
        };
        self.parcels.lock().await.insert(id, parcel.clone());
        Ok(parcel)
    }

    async fn delete_user_address(&self, address_id: AddressId) -> Result<()> {
        self.record(
            "DELETE /user_addresses/{id}",
            format!("DELETE /user_addresses/{address_id}"),
        )
        .await
    }

    async fn delete_recipient(&self, recipient_id: RecipientId) -> Result<()> {
        self.record(
            "DELETE /recipients/{id}",
            format!("DELETE /recipients/{recipient_id}"),
        )
        .await
    }

    async fn delete_recipient_address(&self, address_id: AddressId) -> Result<()> {
        self.record(
            "DELETE /recipient_addresses/{id}",
            format!("DELETE /recipient_addresses/{address_id}"),
        )
        .await
    }

    async fn list_parcels(&self, user_id: UserId) -> Result<Vec<ParcelRecord>> {
        self.record("GET /parcels", format!("GET /parcels?user_id={user_id}"))
            .await?;
        let mut parcels: Vec<ParcelRecord> = self
            .parcels
            .lock()
            .await
            .values()
            .filter(|parcel| parcel.sender_id() == Some(user_id))
            .cloned()
            .collect();
        parcels.sort_by_key(|parcel| parcel.id);
        Ok(parcels)
    }

    async fn fetch_parcel(&self, parcel_id: ParcelId) -> Result<ParcelRecord> {
        self.record("GET /parcels/{id}", format!("GET /parcels/{parcel_id}"))
            .await?;
        self.parcels
            .lock()
            .await
            .get(&parcel_id)
            .cloned()
            .ok_or_else(|| anyhow!(BackendRejection::new("GET /parcels/{id}", 404, "Parcel not found")))
    }

    async fn update_parcel_status(&self, parcel_id: ParcelId, status: ParcelStatus) -> Result<()> {
        self.record("PATCH /parcels/{id}", format!("PATCH /parcels/{parcel_id}"))
            .await?;
        if let Some(parcel) = self.parcels.lock().await.get_mut(&parcel_id) {
            parcel.status = status;
        }
        Ok(())
    }

    async fn send_email(&self, email: &EmailRequest) -> Result<()> {
        self.record("POST /send-email", "POST /send-email".into())
            .await?;
        self.emails.lock().await.push(email.clone());
        Ok(())
    }
}

pub(crate) fn lat_lng(lat: f64, lng: f64) -> LatLng {
    LatLng::new(lat, lng)
}

/// One route, one leg, Nairobi to Mombasa, with a detour step that sticks out
/// past both endpoints.
pub(crate) fn nairobi_to_mombasa() -> DirectionsResponse {
    let nairobi = lat_lng(-1.2864, 36.8172);
    let mombasa = lat_lng(-4.0435, 39.6682);
    let voi = lat_lng(-3.3961, 38.5561);
    let detour = lat_lng(-4.3000, 39.9000);
    DirectionsResponse {
        status: DirectionsStatus::Ok,
        routes: vec![Route {
            summary: Some("A109".into()),
            legs: vec![Leg {
                distance: TextValue {
                    text: "485 km".into(),
                    value: Some(485_000),
                },
                duration: TextValue {
                    text: "7 hours 40 mins".into(),
                    value: Some(27_600),
                },
                start_location: nairobi,
                end_location: mombasa,
                start_address: None,
                end_address: None,
                steps: vec![
                    Step {
                        start_location: nairobi,
                        end_location: voi,
                        distance: None,
                        duration: None,
                    },
                    Step {
                        start_location: voi,
                        end_location: detour,
                        distance: None,
                        duration: None,
                    },
                    Step {
                        start_location: detour,
                        end_location: mombasa,
                        distance: None,
                        duration: None,
                    },
                ],
            }],
        }],
        error_message: None,
    }
}

/// Directions fake answering every request with the same response.
pub(crate) struct ScriptedDirections {
    response: Result<DirectionsResponse, String>,
    requests: Mutex<Vec<DirectionsRequest>>,
}

impl ScriptedDirections {
    pub(crate) fn ok(response: DirectionsResponse) -> Self {
        Self {
            response: Ok(response),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn status(status: DirectionsStatus) -> Self {
        Self::ok(DirectionsResponse {
            status,
            routes: Vec::new(),
            error_message: None,
        })
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn requests(&self) -> Vec<DirectionsRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl DirectionsService for ScriptedDirections {
    async fn route(&self, request: DirectionsRequest) -> Result<DirectionsResponse> {
        self.requests.lock().await.push(request);
        self.response.clone().map_err(|message| anyhow!(message))
    }
}
