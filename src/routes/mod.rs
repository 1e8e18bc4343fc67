use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{config::AppConfig, error::AppError, state::AppState};

pub mod albums;
pub mod bookings;
pub mod health;
pub mod links;
pub mod messages;
pub mod profiles;

/// Room for multipart boundaries and the caption field on top of the image.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(&state.config);
    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let booking_routes = Router::new()
        .route(
            "/",
            get(bookings::list_bookings).post(bookings::create_booking),
        )
        .route("/as-client", get(bookings::list_client_bookings))
        .route("/guest", post(bookings::create_guest_booking))
        .route(
            "/:id",
            get(bookings::get_booking)
                .put(bookings::update_booking)
                .delete(bookings::delete_booking),
        )
        .route(
            "/:id/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route(
            "/:id/guest-messages",
            get(messages::list_guest_messages).post(messages::send_guest_message),
        );

    let album_routes = Router::new()
        .route("/", get(albums::list_albums).post(albums::create_album))
        .route(
            "/:id",
            get(albums::get_album)
                .put(albums::update_album)
                .delete(albums::delete_album),
        )
        .route(
            "/:id/images",
            get(albums::list_images).post(albums::upload_image),
        )
        .route("/:id/images/:image_id", delete(albums::delete_image));

    let link_routes = Router::new()
        .route("/", get(links::list_links).post(links::create_link))
        .route("/:id", put(links::update_link).delete(links::delete_link));

    let profile_routes = Router::new()
        .route(
            "/me",
            get(profiles::get_own_profile).put(profiles::upsert_own_profile),
        )
        .route("/:username", get(profiles::get_portfolio));

    Router::new()
        .route("/api/health", get(health::health_check))
        .nest("/api/bookings", booking_routes)
        .nest("/api/albums", album_routes)
        .nest("/api/custom-links", link_routes)
        .nest("/api/profiles", profile_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Router served when required settings are missing: every request gets the
/// "not configured" envelope, CORS preflights still succeed.
pub fn create_unconfigured_router(config: &AppConfig) -> Router<()> {
    Router::new()
        .fallback(|| async { AppError::not_configured() })
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let allow_origin = match config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
