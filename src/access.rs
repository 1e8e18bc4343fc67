//! Booking access guard.
//!
//! Every booking or message operation is gated by exactly one of two rules:
//!
//! * owner rule: the verified caller id equals the booking's `user_id`. A
//!   booking that exists but belongs to someone else is reported exactly like
//!   a missing one.
//! * claimant rule: an anonymous caller presents a [`ClaimantProof`] that a
//!   [`ClaimantVerifier`] checks against the stored booking. A missing booking
//!   is 404 and a failed check is 403.

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::Booking;
use crate::state::AppState;
use crate::validation::required_text;

pub const BOOKING_NOT_FOUND: &str = "booking not found";

/// Trimmed and lowercased; the only form in which booking emails are compared.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// What an anonymous client offers to show they are party to a booking.
#[derive(Debug, Clone)]
pub struct ClaimantProof {
    pub email: String,
}

impl ClaimantProof {
    pub fn from_email(email: Option<&str>) -> AppResult<Self> {
        let email = required_text("email", email.unwrap_or_default())?;
        Ok(Self { email })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("email does not match booking")]
    EmailMismatch,
}

pub trait ClaimantVerifier: Send + Sync + 'static {
    fn verify(&self, booking: &Booking, proof: &ClaimantProof) -> Result<(), ClaimError>;
}

/// Accepts a claimant whose email equals the booking's email after
/// normalization. The email is visible to anyone who knows it, so this is
/// association, not authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmailClaimant;

impl ClaimantVerifier for EmailClaimant {
    fn verify(&self, booking: &Booking, proof: &ClaimantProof) -> Result<(), ClaimError> {
        if normalize_email(&booking.email) == normalize_email(&proof.email) {
            Ok(())
        } else {
            Err(ClaimError::EmailMismatch)
        }
    }
}

pub fn owned_booking(
    state: &AppState,
    booking_id: Uuid,
    user: &AuthenticatedUser,
) -> AppResult<Booking> {
    state
        .store
        .find_owned_booking(booking_id, user.user_id)?
        .ok_or_else(|| AppError::not_found_msg(BOOKING_NOT_FOUND))
}

pub fn claimed_booking(
    state: &AppState,
    booking_id: Uuid,
    proof: &ClaimantProof,
) -> AppResult<Booking> {
    let booking = state
        .store
        .find_booking(booking_id)?
        .ok_or_else(|| AppError::not_found_msg(BOOKING_NOT_FOUND))?;

    if let Err(err) = state.claimants.verify(&booking, proof) {
        warn!(booking_id = %booking_id, "claimant verification failed");
        return Err(AppError::forbidden(err.to_string()));
    }

    Ok(booking)
}
