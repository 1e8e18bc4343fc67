//! Field checks shared by the write handlers. Every check runs before the
//! store is touched.

use url::Url;

use crate::error::{AppError, AppResult};
use crate::models::BookingStatus;

pub const MAX_MESSAGE_LENGTH: usize = 5000;
/// Width of the `VARCHAR(255)` name, email and title columns.
pub const MAX_SHORT_TEXT_LENGTH: usize = 255;

/// Trimmed value of a field that must not be blank.
pub fn required_text(field: &str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn at_most(field: &str, value: String, max: usize) -> AppResult<String> {
    if value.chars().count() > max {
        return Err(AppError::bad_request(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value)
}

/// Required text that has to fit a `VARCHAR(255)` column.
pub fn short_text(field: &str, value: &str) -> AppResult<String> {
    at_most(field, required_text(field, value)?, MAX_SHORT_TEXT_LENGTH)
}

/// Like [`optional_text`], but bounded to [`MAX_SHORT_TEXT_LENGTH`].
pub fn optional_short_text(field: &str, value: Option<String>) -> AppResult<Option<String>> {
    optional_text(value)
        .map(|value| at_most(field, value, MAX_SHORT_TEXT_LENGTH))
        .transpose()
}

/// Blank optional text is stored as absent.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `local@domain.tld`: one `@`, no whitespace, and a dot inside the domain
/// with text on both sides.
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }

    let mut parts = value.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    !local.is_empty()
        && domain
            .char_indices()
            .any(|(index, ch)| ch == '.' && index > 0 && index + 1 < domain.len())
}

pub fn required_email(value: &str) -> AppResult<String> {
    let trimmed = short_text("email", value)?;
    if !is_valid_email(&trimmed) {
        return Err(AppError::bad_request(
            "email must be a valid email address",
        ));
    }
    Ok(trimmed)
}

/// Absent or blank status means `pending`.
pub fn booking_status(value: Option<&str>) -> AppResult<BookingStatus> {
    match value.map(str::trim) {
        None | Some("") => Ok(BookingStatus::Pending),
        Some(raw) => raw.parse().map_err(AppError::bad_request),
    }
}

pub fn message_body(value: &str) -> AppResult<String> {
    at_most("body", required_text("body", value)?, MAX_MESSAGE_LENGTH)
}

pub fn username(value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    let length = trimmed.chars().count();
    let allowed = trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'));

    if !(3..=32).contains(&length) || !allowed {
        return Err(AppError::bad_request(
            "username must be 3-32 characters of letters, digits, '_', '.' or '-'",
        ));
    }
    Ok(trimmed.to_string())
}

/// Absolute `http`/`https` URL.
pub fn http_url(field: &str, value: &str) -> AppResult<String> {
    let trimmed = required_text(field, value)?;
    let parsed = Url::parse(&trimmed)
        .map_err(|_| AppError::bad_request(format!("{field} must be an absolute URL")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::bad_request(format!(
            "{field} must use http or https"
        )));
    }
    Ok(trimmed)
}
