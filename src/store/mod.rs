//! Persistence seam. Handlers only see these traits; `PgStore` backs them with
//! Postgres and the integration tests back them with an in-memory fake.
//!
//! Every owner-scoped mutation takes both the row id and the owner id so that
//! a non-owner's write matches zero rows instead of being checked separately.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Album, AlbumChanges, Booking, BookingChanges, BookingMessage, ClientBooking, CustomLink,
    CustomLinkChanges, Image, NewAlbum, NewBooking, NewBookingMessage, NewCustomLink, NewImage,
    NewProfile, Profile, ProfileChanges,
};

pub mod pg;

pub use pg::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no matching row")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("database pool error: {0}")]
    Pool(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait ProfileStore: Send + Sync + 'static {
    fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>>;

    /// Case-insensitive exact match on the username.
    fn find_profile_by_username(&self, username: &str) -> StoreResult<Option<Profile>>;

    fn insert_profile(&self, profile: NewProfile) -> StoreResult<Profile>;

    fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<Profile>>;
}

pub trait BookingStore: Send + Sync + 'static {
    fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking>;

    fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    fn find_owned_booking(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Booking>>;

    /// Newest first.
    fn list_owned_bookings(&self, owner_id: Uuid) -> StoreResult<Vec<Booking>>;

    /// Bookings whose trimmed, lowercased email equals `normalized_email`,
    /// newest first, joined with the owning model's profile.
    fn list_client_bookings(&self, normalized_email: &str) -> StoreResult<Vec<ClientBooking>>;

    fn update_owned_booking(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: BookingChanges,
    ) -> StoreResult<Option<Booking>>;

    /// Returns whether a row was deleted. Messages go with it.
    fn delete_owned_booking(&self, id: Uuid, owner_id: Uuid) -> StoreResult<bool>;

    /// Oldest first.
    fn list_messages(&self, booking_id: Uuid) -> StoreResult<Vec<BookingMessage>>;

    fn insert_message(&self, message: NewBookingMessage) -> StoreResult<BookingMessage>;
}

pub trait AlbumStore: Send + Sync + 'static {
    fn insert_album(&self, album: NewAlbum) -> StoreResult<Album>;

    fn find_album(&self, id: Uuid) -> StoreResult<Option<Album>>;

    fn find_owned_album(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Album>>;

    /// Newest first.
    fn list_albums(&self, owner_id: Uuid) -> StoreResult<Vec<Album>>;

    fn update_owned_album(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: AlbumChanges,
    ) -> StoreResult<Option<Album>>;

    /// Deletes the album and its image rows, returning the removed images so
    /// their stored objects can be cleaned up.
    fn delete_owned_album(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Vec<Image>>>;

    /// Upload order.
    fn list_images(&self, album_id: Uuid) -> StoreResult<Vec<Image>>;

    fn insert_image(&self, image: NewImage) -> StoreResult<Image>;

    fn delete_owned_image(
        &self,
        album_id: Uuid,
        image_id: Uuid,
        owner_id: Uuid,
    ) -> StoreResult<Option<Image>>;

    fn image_storage_keys(&self) -> StoreResult<Vec<String>>;
}

pub trait LinkStore: Send + Sync + 'static {
    /// Ordered by position, then creation time.
    fn list_links(&self, owner_id: Uuid) -> StoreResult<Vec<CustomLink>>;

    fn next_link_position(&self, owner_id: Uuid) -> StoreResult<i32>;

    fn insert_link(&self, link: NewCustomLink) -> StoreResult<CustomLink>;

    fn update_owned_link(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: CustomLinkChanges,
    ) -> StoreResult<Option<CustomLink>>;

    fn delete_owned_link(&self, id: Uuid, owner_id: Uuid) -> StoreResult<bool>;
}

pub trait Store: ProfileStore + BookingStore + AlbumStore + LinkStore {}

impl<T> Store for T where T: ProfileStore + BookingStore + AlbumStore + LinkStore {}
