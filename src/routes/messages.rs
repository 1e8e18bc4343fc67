use axum::extract::State;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::access::{claimed_booking, owned_booking, ClaimantProof};
use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::extract::{Json, Path, Query};
use crate::models::{BookingMessage, NewBookingMessage};
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::validation::message_body;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub body: String,
}

#[derive(Deserialize)]
pub struct GuestThreadQuery {
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct GuestMessageRequest {
    pub email: Option<String>,
    #[serde(default)]
    pub body: String,
}

pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<Uuid>,
) -> AppResult<ApiResponse<Vec<BookingMessage>>> {
    let booking = owned_booking(&state, booking_id, &user)?;
    let messages = state.store.list_messages(booking.id)?;
    Ok(ApiResponse::ok(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<ApiResponse<BookingMessage>> {
    let body = message_body(&payload.body)?;
    let booking = owned_booking(&state, booking_id, &user)?;

    let message = state
        .store
        .insert_message(NewBookingMessage::from_model(booking.id, user.user_id, body))?;

    info!(booking_id = %booking.id, message_id = %message.id, "model message sent");
    Ok(ApiResponse::created(message))
}

pub async fn list_guest_messages(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Query(query): Query<GuestThreadQuery>,
) -> AppResult<ApiResponse<Vec<BookingMessage>>> {
    let proof = ClaimantProof::from_email(query.email.as_deref())?;
    let booking = claimed_booking(&state, booking_id, &proof)?;
    let messages = state.store.list_messages(booking.id)?;
    Ok(ApiResponse::ok(messages))
}

pub async fn send_guest_message(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<GuestMessageRequest>,
) -> AppResult<ApiResponse<BookingMessage>> {
    let proof = ClaimantProof::from_email(payload.email.as_deref())?;
    let body = message_body(&payload.body)?;
    let booking = claimed_booking(&state, booking_id, &proof)?;

    let message = state
        .store
        .insert_message(NewBookingMessage::from_client(booking.id, body))?;

    info!(booking_id = %booking.id, message_id = %message.id, "client message sent");
    Ok(ApiResponse::created(message))
}
