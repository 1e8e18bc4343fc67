use axum::extract::State;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::extract::{Json, Path};
use crate::models::{Album, CustomLink, NewProfile, Profile, ProfileChanges};
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::utils::json::{classify_nullable, classify_string, NullableValue};
use crate::validation::{http_url, optional_short_text, optional_text, username};

const PROFILE_NOT_FOUND: &str = "profile not found";

/// Everything a visitor sees on a model's public page.
#[derive(Serialize)]
pub struct Portfolio {
    pub profile: Profile,
    pub albums: Vec<Album>,
    pub links: Vec<CustomLink>,
}

pub async fn get_own_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<ApiResponse<Profile>> {
    let profile = state
        .store
        .find_profile(user.user_id)?
        .ok_or_else(|| AppError::not_found_msg(PROFILE_NOT_FOUND))?;
    Ok(ApiResponse::ok(profile))
}

pub async fn upsert_own_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<Value>,
) -> AppResult<ApiResponse<Profile>> {
    let changes = profile_changes(&body)?;

    if let Some(username) = changes.username.as_deref() {
        ensure_username_available(&state, username, user.user_id)?;
    }

    match state.store.find_profile(user.user_id)? {
        Some(_) => {
            let profile = state
                .store
                .update_profile(user.user_id, changes)?
                .ok_or_else(|| AppError::not_found_msg(PROFILE_NOT_FOUND))?;
            info!(profile_id = %profile.id, "profile updated");
            Ok(ApiResponse::ok(profile))
        }
        None => {
            let username = changes
                .username
                .ok_or_else(|| AppError::bad_request("username is required"))?;
            let profile = state.store.insert_profile(NewProfile {
                id: user.user_id,
                username,
                display_name: changes.display_name.flatten(),
                bio: changes.bio.flatten(),
                avatar_url: changes.avatar_url.flatten(),
            })?;
            info!(profile_id = %profile.id, username = %profile.username, "profile created");
            Ok(ApiResponse::created(profile))
        }
    }
}

pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<ApiResponse<Portfolio>> {
    let profile = state
        .store
        .find_profile_by_username(username.trim())?
        .ok_or_else(|| AppError::not_found_msg(PROFILE_NOT_FOUND))?;

    let albums = state.store.list_albums(profile.id)?;
    let links = state
        .store
        .list_links(profile.id)?
        .into_iter()
        .filter(|link| link.enabled)
        .collect();

    Ok(ApiResponse::ok(Portfolio {
        profile,
        albums,
        links,
    }))
}

fn ensure_username_available(state: &AppState, username: &str, caller: Uuid) -> AppResult<()> {
    match state.store.find_profile_by_username(username)? {
        Some(existing) if existing.id != caller => {
            Err(AppError::bad_request("username already taken"))
        }
        _ => Ok(()),
    }
}

fn profile_changes(body: &Value) -> AppResult<ProfileChanges> {
    if !body.is_object() {
        return Err(AppError::bad_request("request body must be a JSON object"));
    }

    let mut changes = ProfileChanges::default();

    if let Some(value) =
        classify_string("username", body.get("username")).map_err(AppError::bad_request)?
    {
        changes.username = Some(username(&value)?);
    }

    changes.display_name = nullable_text(body, "display_name")?
        .map(|value| optional_short_text("display_name", value))
        .transpose()?;
    changes.bio = nullable_text(body, "bio")?;
    changes.avatar_url = match nullable_text(body, "avatar_url")? {
        Some(Some(url)) => Some(Some(http_url("avatar_url", &url)?)),
        other => other,
    };

    Ok(changes)
}

fn nullable_text(body: &Value, field: &str) -> AppResult<Option<Option<String>>> {
    match classify_nullable(body.get(field))
        .map_err(|_| AppError::bad_request(format!("{field} must be a string or null")))?
    {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Ok(Some(None)),
        NullableValue::String(value) => Ok(Some(optional_text(Some(value)))),
    }
}
