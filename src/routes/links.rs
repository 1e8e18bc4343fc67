use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::extract::{Json, Path};
use crate::models::{CustomLink, CustomLinkChanges, NewCustomLink};
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::utils::json::{classify_bool, classify_nullable, classify_string, NullableValue};
use crate::validation::{http_url, short_text};

const LINK_NOT_FOUND: &str = "link not found";

#[derive(Deserialize)]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub icon_url: Option<String>,
    pub enabled: Option<bool>,
}

pub async fn list_links(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<ApiResponse<Vec<CustomLink>>> {
    let links = state.store.list_links(user.user_id)?;
    Ok(ApiResponse::ok(links))
}

pub async fn create_link(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateLinkRequest>,
) -> AppResult<ApiResponse<CustomLink>> {
    let title = short_text("title", &payload.title)?;
    let url = http_url("url", &payload.url)?;
    let icon_url = match payload.icon_url.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(icon) => Some(http_url("icon_url", icon)?),
    };

    let position = state.store.next_link_position(user.user_id)?;
    let link = state.store.insert_link(NewCustomLink {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        title,
        url,
        icon_url,
        enabled: payload.enabled.unwrap_or(true),
        position,
    })?;

    info!(link_id = %link.id, position = link.position, "custom link created");
    Ok(ApiResponse::created(link))
}

pub async fn update_link(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(link_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<ApiResponse<CustomLink>> {
    let changes = link_changes(&body)?;

    let link = state
        .store
        .update_owned_link(link_id, user.user_id, changes)?
        .ok_or_else(|| AppError::not_found_msg(LINK_NOT_FOUND))?;

    info!(link_id = %link.id, "custom link updated");
    Ok(ApiResponse::ok(link))
}

pub async fn delete_link(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(link_id): Path<Uuid>,
) -> AppResult<ApiResponse<()>> {
    if !state.store.delete_owned_link(link_id, user.user_id)? {
        return Err(AppError::not_found_msg(LINK_NOT_FOUND));
    }

    info!(link_id = %link_id, "custom link deleted");
    Ok(ApiResponse::message("Link deleted"))
}

fn link_changes(body: &Value) -> AppResult<CustomLinkChanges> {
    if !body.is_object() {
        return Err(AppError::bad_request("request body must be a JSON object"));
    }
    if body.get("user_id").is_some() {
        return Err(AppError::bad_request("user_id cannot be changed"));
    }

    let mut changes = CustomLinkChanges::default();

    if let Some(title) =
        classify_string("title", body.get("title")).map_err(AppError::bad_request)?
    {
        changes.title = Some(short_text("title", &title)?);
    }

    if let Some(url) = classify_string("url", body.get("url")).map_err(AppError::bad_request)? {
        changes.url = Some(http_url("url", &url)?);
    }

    changes.icon_url = match classify_nullable(body.get("icon_url"))
        .map_err(|_| AppError::bad_request("icon_url must be a string or null"))?
    {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::String(value) if value.trim().is_empty() => Some(None),
        NullableValue::String(value) => Some(Some(http_url("icon_url", &value)?)),
    };

    changes.enabled = classify_bool("enabled", body.get("enabled")).map_err(AppError::bad_request)?;

    changes.position = match body.get("position") {
        None => None,
        Some(value) => Some(
            value
                .as_u64()
                .and_then(|position| i32::try_from(position).ok())
                .ok_or_else(|| AppError::bad_request("position must be a non-negative integer"))?,
        ),
    };

    Ok(changes)
}
