use std::io::Cursor;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::extract::{Json, Path, Query};
use crate::models::{Album, AlbumChanges, Image, NewAlbum, NewImage};
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::utils::json::{classify_nullable, classify_string, NullableValue};
use crate::validation::{optional_text, short_text};

const ALBUM_NOT_FOUND: &str = "album not found";

#[derive(Deserialize)]
pub struct AlbumListQuery {
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateAlbumRequest {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct AlbumDetail {
    #[serde(flatten)]
    pub album: Album,
    pub images: Vec<Image>,
}

pub async fn list_albums(
    State(state): State<AppState>,
    Query(query): Query<AlbumListQuery>,
) -> AppResult<ApiResponse<Vec<Album>>> {
    let username = query
        .username
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let owner_id = match (query.user_id, username) {
        (Some(user_id), _) => user_id,
        (None, Some(username)) => match state.store.find_profile_by_username(username)? {
            Some(profile) => profile.id,
            None => return Err(AppError::not_found_msg("profile not found")),
        },
        (None, None) => return Err(AppError::bad_request("user_id or username is required")),
    };

    let albums = state.store.list_albums(owner_id)?;
    Ok(ApiResponse::ok(albums))
}

pub async fn create_album(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateAlbumRequest>,
) -> AppResult<ApiResponse<Album>> {
    let album = state.store.insert_album(NewAlbum {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        title: short_text("title", &payload.title)?,
        description: optional_text(payload.description),
    })?;

    info!(album_id = %album.id, owner_id = %album.user_id, "album created");
    Ok(ApiResponse::created(album))
}

pub async fn get_album(
    State(state): State<AppState>,
    Path(album_id): Path<Uuid>,
) -> AppResult<ApiResponse<AlbumDetail>> {
    let album = state
        .store
        .find_album(album_id)?
        .ok_or_else(|| AppError::not_found_msg(ALBUM_NOT_FOUND))?;
    let images = state.store.list_images(album.id)?;
    Ok(ApiResponse::ok(AlbumDetail { album, images }))
}

pub async fn update_album(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(album_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<ApiResponse<Album>> {
    let changes = album_changes(&body)?;

    let album = owned_album(&state, album_id, &user)?;
    if let Some(Some(cover_id)) = changes.cover_image_id {
        let belongs = state
            .store
            .list_images(album.id)?
            .iter()
            .any(|image| image.id == cover_id);
        if !belongs {
            return Err(AppError::bad_request(
                "cover_image_id must reference an image in this album",
            ));
        }
    }

    let album = state
        .store
        .update_owned_album(album.id, user.user_id, changes)?
        .ok_or_else(|| AppError::not_found_msg(ALBUM_NOT_FOUND))?;

    info!(album_id = %album.id, "album updated");
    Ok(ApiResponse::ok(album))
}

pub async fn delete_album(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(album_id): Path<Uuid>,
) -> AppResult<ApiResponse<()>> {
    let images = state
        .store
        .delete_owned_album(album_id, user.user_id)?
        .ok_or_else(|| AppError::not_found_msg(ALBUM_NOT_FOUND))?;

    for image in &images {
        remove_object(&state, &image.storage_key).await;
    }

    info!(album_id = %album_id, images = images.len(), "album deleted");
    Ok(ApiResponse::message("Album deleted"))
}

pub async fn list_images(
    State(state): State<AppState>,
    Path(album_id): Path<Uuid>,
) -> AppResult<ApiResponse<Vec<Image>>> {
    let album = state
        .store
        .find_album(album_id)?
        .ok_or_else(|| AppError::not_found_msg(ALBUM_NOT_FOUND))?;
    let images = state.store.list_images(album.id)?;
    Ok(ApiResponse::ok(images))
}

pub async fn upload_image(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(album_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<ApiResponse<Image>> {
    let album = owned_album(&state, album_id, &user)?;
    let limit = state.config.max_upload_bytes;

    let mut image_bytes: Option<Vec<u8>> = None;
    let mut caption: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, limit))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| multipart_error(err, limit))?;
                image_bytes = Some(data.to_vec());
            }
            Some("caption") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| multipart_error(err, limit))?;
                caption = optional_text(Some(value));
            }
            _ => {}
        }
    }

    let bytes = image_bytes.ok_or_else(|| AppError::bad_request("image field is required"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("image field must not be empty"));
    }
    if bytes.len() > limit {
        warn!(album_id = %album.id, size = bytes.len(), "upload rejected: too large");
        return Err(AppError::payload_too_large(limit));
    }

    let probe = probe_image(&bytes)?;
    let image_id = Uuid::new_v4();
    let storage_key = format!(
        "images/{}/{}/{}.{}",
        user.user_id, album.id, image_id, probe.extension
    );
    let checksum = hex::encode(Sha256::digest(&bytes));
    let size_bytes = i64::try_from(bytes.len()).map_err(AppError::internal)?;

    state
        .storage
        .put_object(&storage_key, bytes, Some(probe.content_type.to_string()))
        .await
        .map_err(|err| {
            error!(error = ?err, key = %storage_key, "image upload to storage failed");
            AppError::internal(err)
        })?;

    let new_image = NewImage {
        id: image_id,
        album_id: album.id,
        user_id: user.user_id,
        url: state.storage.public_url(&storage_key),
        storage_key: storage_key.clone(),
        caption,
        content_type: probe.content_type.to_string(),
        size_bytes,
        checksum,
        width: probe.width,
        height: probe.height,
    };

    let image = match state.store.insert_image(new_image) {
        Ok(image) => image,
        Err(err) => {
            error!(error = %err, key = %storage_key, "image row insert failed");
            remove_object(&state, &storage_key).await;
            return Err(err.into());
        }
    };

    info!(
        album_id = %album.id,
        image_id = %image.id,
        size_bytes = image.size_bytes,
        "image uploaded"
    );
    Ok(ApiResponse::created(image))
}

pub async fn delete_image(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((album_id, image_id)): Path<(Uuid, Uuid)>,
) -> AppResult<ApiResponse<()>> {
    let image = state
        .store
        .delete_owned_image(album_id, image_id, user.user_id)?
        .ok_or_else(|| AppError::not_found_msg("image not found"))?;

    remove_object(&state, &image.storage_key).await;

    info!(album_id = %album_id, image_id = %image_id, "image deleted");
    Ok(ApiResponse::message("Image deleted"))
}

fn owned_album(state: &AppState, album_id: Uuid, user: &AuthenticatedUser) -> AppResult<Album> {
    state
        .store
        .find_owned_album(album_id, user.user_id)?
        .ok_or_else(|| AppError::not_found_msg(ALBUM_NOT_FOUND))
}

/// Object deletion that never fails the request; leftovers are collected by
/// `maintenance prune-orphans`.
async fn remove_object(state: &AppState, key: &str) {
    if let Err(err) = state.storage.delete_object(key).await {
        warn!(error = ?err, key = %key, "failed to delete stored object");
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::payload_too_large(limit);
    }
    AppError::bad_request(format!("invalid multipart data: {}", err.body_text()))
}

#[derive(Debug, PartialEq, Eq)]
struct ImageProbe {
    content_type: &'static str,
    extension: &'static str,
    width: i32,
    height: i32,
}

/// Sniffs the format from the bytes themselves and reads the dimensions.
fn probe_image(bytes: &[u8]) -> AppResult<ImageProbe> {
    let unsupported = || AppError::bad_request("image must be a PNG or JPEG file");

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|_| unsupported())?;

    let (content_type, extension) = match reader.format() {
        Some(ImageFormat::Png) => ("image/png", "png"),
        Some(ImageFormat::Jpeg) => ("image/jpeg", "jpg"),
        _ => return Err(unsupported()),
    };

    let (width, height) = reader
        .into_dimensions()
        .map_err(|_| AppError::bad_request("image could not be decoded"))?;

    Ok(ImageProbe {
        content_type,
        extension,
        width: i32::try_from(width).map_err(|_| unsupported())?,
        height: i32::try_from(height).map_err(|_| unsupported())?,
    })
}

fn album_changes(body: &Value) -> AppResult<AlbumChanges> {
    if !body.is_object() {
        return Err(AppError::bad_request("request body must be a JSON object"));
    }
    if body.get("user_id").is_some() {
        return Err(AppError::bad_request("user_id cannot be changed"));
    }

    let mut changes = AlbumChanges::default();

    if let Some(title) =
        classify_string("title", body.get("title")).map_err(AppError::bad_request)?
    {
        changes.title = Some(short_text("title", &title)?);
    }

    changes.description = match classify_nullable(body.get("description"))
        .map_err(|_| AppError::bad_request("description must be a string or null"))?
    {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::String(value) => Some(optional_text(Some(value))),
    };

    changes.cover_image_id = match classify_nullable(body.get("cover_image_id"))
        .map_err(|_| AppError::bad_request("cover_image_id must be a UUID or null"))?
    {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::String(value) => Some(Some(
            Uuid::parse_str(value.trim())
                .map_err(|_| AppError::bad_request("cover_image_id must be a UUID or null"))?,
        )),
    };

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn probes_png_dimensions() {
        let probe = probe_image(&png_bytes(3, 2)).unwrap();
        assert_eq!(
            probe,
            ImageProbe {
                content_type: "image/png",
                extension: "png",
                width: 3,
                height: 2,
            }
        );
    }

    #[test]
    fn rejects_non_image_bytes() {
        let err = probe_image(b"%PDF-1.7 definitely not an image").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn cover_can_be_cleared_or_set() {
        let cover = Uuid::new_v4();
        let changes = album_changes(&json!({ "cover_image_id": cover })).unwrap();
        assert_eq!(changes.cover_image_id, Some(Some(cover)));

        let changes = album_changes(&json!({ "cover_image_id": null })).unwrap();
        assert_eq!(changes.cover_image_id, Some(None));
    }

    #[test]
    fn rejects_blank_title_and_bad_cover() {
        assert!(album_changes(&json!({ "title": " " })).is_err());
        assert!(album_changes(&json!({ "cover_image_id": "nope" })).is_err());
    }
}
