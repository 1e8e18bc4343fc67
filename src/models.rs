use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Accepted,
        BookingStatus::Rejected,
        BookingStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| {
                format!(
                    "status must be one of: {}",
                    BookingStatus::ALL.map(|status| status.as_str()).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    Model,
    Client,
}

impl SenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderKind::Model => "model",
            SenderKind::Client => "client",
        }
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = profiles)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub display_name: Option<Option<String>>,
    pub bio: Option<Option<String>>,
    pub avatar_url: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = bookings)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub job_type: Option<String>,
    pub dates: Option<String>,
    pub location: Option<String>,
    pub pay_rate: Option<String>,
    pub details: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bookings)]
pub struct NewBooking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub job_type: Option<String>,
    pub dates: Option<String>,
    pub location: Option<String>,
    pub pay_rate: Option<String>,
    pub details: Option<String>,
    pub status: String,
}

/// Partial booking update. There is no `user_id`: ownership never
/// changes after creation.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = bookings)]
pub struct BookingChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub job_type: Option<Option<String>>,
    pub dates: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub pay_rate: Option<Option<String>>,
    pub details: Option<Option<String>>,
    pub status: Option<String>,
}

/// A booking seen from the client side, with the booked model's public names.
#[derive(Debug, Clone, Serialize)]
pub struct ClientBooking {
    #[serde(flatten)]
    pub booking: Booking,
    pub model_name: Option<String>,
    pub model_username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = booking_messages)]
#[diesel(belongs_to(Booking))]
pub struct BookingMessage {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub sender_kind: String,
    pub sender_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = booking_messages)]
pub struct NewBookingMessage {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub sender_kind: String,
    pub sender_id: Option<Uuid>,
    pub body: String,
}

impl NewBookingMessage {
    pub fn from_model(booking_id: Uuid, sender_id: Uuid, body: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            booking_id,
            sender_kind: SenderKind::Model.as_str().to_string(),
            sender_id: Some(sender_id),
            body,
        }
    }

    pub fn from_client(booking_id: Uuid, body: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            booking_id,
            sender_kind: SenderKind::Client.as_str().to_string(),
            sender_id: None,
            body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = albums)]
pub struct Album {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub cover_image_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = albums)]
pub struct NewAlbum {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = albums)]
pub struct AlbumChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub cover_image_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = images)]
#[diesel(belongs_to(Album))]
pub struct Image {
    pub id: Uuid,
    pub album_id: Uuid,
    pub user_id: Uuid,
    pub storage_key: String,
    pub url: String,
    pub caption: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub width: i32,
    pub height: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = images)]
pub struct NewImage {
    pub id: Uuid,
    pub album_id: Uuid,
    pub user_id: Uuid,
    pub storage_key: String,
    pub url: String,
    pub caption: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = custom_links)]
pub struct CustomLink {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub url: String,
    pub icon_url: Option<String>,
    pub enabled: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = custom_links)]
pub struct NewCustomLink {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub url: String,
    pub icon_url: Option<String>,
    pub enabled: bool,
    pub position: i32,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = custom_links)]
pub struct CustomLinkChanges {
    pub title: Option<String>,
    pub url: Option<String>,
    pub icon_url: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub position: Option<i32>,
}
