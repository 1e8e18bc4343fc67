use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::access::{normalize_email, owned_booking, BOOKING_NOT_FOUND};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::extract::{Json, Path};
use crate::models::{Booking, BookingChanges, BookingStatus, ClientBooking, NewBooking};
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::utils::json::{classify_nullable, classify_string, NullableValue};
use crate::validation::{booking_status, optional_text, required_email, short_text};

#[derive(Deserialize)]
pub struct BookingFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub job_type: Option<String>,
    pub dates: Option<String>,
    pub location: Option<String>,
    pub pay_rate: Option<String>,
    pub details: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct GuestBookingRequest {
    pub model_id: Option<Uuid>,
    pub username: Option<String>,
    #[serde(flatten)]
    pub fields: BookingFields,
}

/// Validated booking input, ready to be attached to an owner.
struct BookingDraft {
    name: String,
    email: String,
    job_type: Option<String>,
    dates: Option<String>,
    location: Option<String>,
    pay_rate: Option<String>,
    details: Option<String>,
    status: BookingStatus,
}

impl BookingDraft {
    fn validate(fields: BookingFields) -> AppResult<Self> {
        Ok(Self {
            name: short_text("name", &fields.name)?,
            email: required_email(&fields.email)?,
            job_type: optional_text(fields.job_type),
            dates: optional_text(fields.dates),
            location: optional_text(fields.location),
            pay_rate: optional_text(fields.pay_rate),
            details: optional_text(fields.details),
            status: booking_status(fields.status.as_deref())?,
        })
    }

    fn into_new_booking(self, owner_id: Uuid) -> NewBooking {
        NewBooking {
            id: Uuid::new_v4(),
            user_id: owner_id,
            name: self.name,
            email: self.email,
            job_type: self.job_type,
            dates: self.dates,
            location: self.location,
            pay_rate: self.pay_rate,
            details: self.details,
            status: self.status.as_str().to_string(),
        }
    }
}

pub async fn list_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<ApiResponse<Vec<Booking>>> {
    let bookings = state.store.list_owned_bookings(user.user_id)?;
    Ok(ApiResponse::ok(bookings))
}

pub async fn list_client_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<ApiResponse<Vec<ClientBooking>>> {
    let Some(email) = user.email.as_deref().map(normalize_email) else {
        return Ok(ApiResponse::ok(Vec::new()));
    };

    let bookings = state.store.list_client_bookings(&email)?;
    Ok(ApiResponse::ok(bookings))
}

pub async fn create_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<BookingFields>,
) -> AppResult<ApiResponse<Booking>> {
    let draft = BookingDraft::validate(payload)?;
    let booking = state
        .store
        .insert_booking(draft.into_new_booking(user.user_id))?;

    info!(booking_id = %booking.id, owner_id = %booking.user_id, "booking created");
    Ok(ApiResponse::created(booking))
}

pub async fn create_guest_booking(
    State(state): State<AppState>,
    Json(payload): Json<GuestBookingRequest>,
) -> AppResult<ApiResponse<Booking>> {
    let GuestBookingRequest {
        model_id,
        username,
        mut fields,
    } = payload;

    // Guests cannot pick a status.
    fields.status = None;
    let draft = BookingDraft::validate(fields)?;

    let username = username
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let owner = match (model_id, username) {
        (Some(model_id), _) => state.store.find_profile(model_id)?,
        (None, Some(username)) => state.store.find_profile_by_username(&username)?,
        (None, None) => {
            return Err(AppError::bad_request("model_id or username is required"));
        }
    }
    .ok_or_else(|| AppError::not_found_msg("model not found"))?;

    let booking = state.store.insert_booking(draft.into_new_booking(owner.id))?;

    info!(
        booking_id = %booking.id,
        owner_id = %booking.user_id,
        "guest booking created"
    );
    Ok(ApiResponse::created(booking))
}

pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<Uuid>,
) -> AppResult<ApiResponse<Booking>> {
    let booking = owned_booking(&state, booking_id, &user)?;
    Ok(ApiResponse::ok(booking))
}

pub async fn update_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<ApiResponse<Booking>> {
    let changes = booking_changes(&body)?;

    let booking = state
        .store
        .update_owned_booking(booking_id, user.user_id, changes)?
        .ok_or_else(|| AppError::not_found_msg(BOOKING_NOT_FOUND))?;

    info!(booking_id = %booking.id, status = %booking.status, "booking updated");
    Ok(ApiResponse::ok(booking))
}

pub async fn delete_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<Uuid>,
) -> AppResult<ApiResponse<()>> {
    if !state.store.delete_owned_booking(booking_id, user.user_id)? {
        return Err(AppError::not_found_msg(BOOKING_NOT_FOUND));
    }

    info!(booking_id = %booking_id, "booking deleted");
    Ok(ApiResponse::message("Booking deleted"))
}

/// Turns a partial update body into a changeset. Omitted keys stay untouched,
/// `null` clears optional text, and a null or blank status resets to pending.
fn booking_changes(body: &Value) -> AppResult<BookingChanges> {
    if !body.is_object() {
        return Err(AppError::bad_request("request body must be a JSON object"));
    }
    if body.get("user_id").is_some() {
        return Err(AppError::bad_request("user_id cannot be changed"));
    }

    let mut changes = BookingChanges::default();

    if let Some(name) = classify_string("name", body.get("name")).map_err(AppError::bad_request)? {
        changes.name = Some(short_text("name", &name)?);
    }

    if let Some(email) =
        classify_string("email", body.get("email")).map_err(AppError::bad_request)?
    {
        changes.email = Some(required_email(&email)?);
    }

    changes.job_type = nullable_text_change(body, "job_type")?;
    changes.dates = nullable_text_change(body, "dates")?;
    changes.location = nullable_text_change(body, "location")?;
    changes.pay_rate = nullable_text_change(body, "pay_rate")?;
    changes.details = nullable_text_change(body, "details")?;

    changes.status = match classify_nullable(body.get("status"))
        .map_err(|_| AppError::bad_request("status must be a string"))?
    {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(BookingStatus::Pending.as_str().to_string()),
        NullableValue::String(value) => Some(booking_status(Some(&value))?.as_str().to_string()),
    };

    Ok(changes)
}

fn nullable_text_change(body: &Value, field: &str) -> AppResult<Option<Option<String>>> {
    match classify_nullable(body.get(field))
        .map_err(|_| AppError::bad_request(format!("{field} must be a string or null")))?
    {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Ok(Some(None)),
        NullableValue::String(value) => Ok(Some(optional_text(Some(value)))),
    }
}
