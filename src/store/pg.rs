use chrono::Utc;
use diesel::{
    dsl::max,
    pg::PgConnection,
    prelude::*,
    r2d2::{ConnectionManager, PooledConnection},
    result::{DatabaseErrorKind, Error as DieselError},
    sql_types::Text,
};
use uuid::Uuid;

use super::{AlbumStore, BookingStore, LinkStore, ProfileStore, StoreError, StoreResult};
use crate::db::PgPool;
use crate::models::{
    Album, AlbumChanges, Booking, BookingChanges, BookingMessage, ClientBooking, CustomLink,
    CustomLinkChanges, Image, NewAlbum, NewBooking, NewBookingMessage, NewCustomLink, NewImage,
    NewProfile, Profile, ProfileChanges,
};
use crate::schema::{albums, booking_messages, bookings, custom_links, images, profiles};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

diesel::define_sql_function!(fn lower(value: Text) -> Text);
diesel::define_sql_function!(fn btrim(value: Text) -> Text);

impl From<DieselError> for StoreError {
    fn from(value: DieselError) -> Self {
        match value {
            DieselError::NotFound => StoreError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            // The parent row vanished between the guard and the insert.
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                StoreError::NotFound
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn conn(&self) -> StoreResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| StoreError::Pool(err.to_string()))
    }
}

impl ProfileStore for PgStore {
    fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        let mut conn = self.conn()?;
        Ok(profiles::table
            .find(id)
            .select(Profile::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn find_profile_by_username(&self, username: &str) -> StoreResult<Option<Profile>> {
        let mut conn = self.conn()?;
        Ok(profiles::table
            .filter(lower(profiles::username).eq(username.to_lowercase()))
            .select(Profile::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn insert_profile(&self, profile: NewProfile) -> StoreResult<Profile> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(profiles::table)
            .values(&profile)
            .returning(Profile::as_returning())
            .get_result(&mut conn)?)
    }

    fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<Profile>> {
        let mut conn = self.conn()?;
        Ok(diesel::update(profiles::table.find(id))
            .set((&changes, profiles::updated_at.eq(Utc::now())))
            .returning(Profile::as_returning())
            .get_result(&mut conn)
            .optional()?)
    }
}

impl BookingStore for PgStore {
    fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(bookings::table)
            .values(&booking)
            .returning(Booking::as_returning())
            .get_result(&mut conn)?)
    }

    fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let mut conn = self.conn()?;
        Ok(bookings::table
            .find(id)
            .select(Booking::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn find_owned_booking(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Booking>> {
        let mut conn = self.conn()?;
        Ok(bookings::table
            .filter(bookings::id.eq(id))
            .filter(bookings::user_id.eq(owner_id))
            .select(Booking::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn list_owned_bookings(&self, owner_id: Uuid) -> StoreResult<Vec<Booking>> {
        let mut conn = self.conn()?;
        Ok(bookings::table
            .filter(bookings::user_id.eq(owner_id))
            .order(bookings::created_at.desc())
            .select(Booking::as_select())
            .load(&mut conn)?)
    }

    fn list_client_bookings(&self, normalized_email: &str) -> StoreResult<Vec<ClientBooking>> {
        let mut conn = self.conn()?;
        let rows: Vec<(Booking, Option<String>, Option<String>)> = bookings::table
            .left_join(profiles::table)
            .filter(lower(btrim(bookings::email)).eq(normalized_email))
            .order(bookings::created_at.desc())
            .select((
                Booking::as_select(),
                profiles::display_name.nullable(),
                profiles::username.nullable(),
            ))
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(booking, model_name, model_username)| ClientBooking {
                booking,
                model_name,
                model_username,
            })
            .collect())
    }

    fn update_owned_booking(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: BookingChanges,
    ) -> StoreResult<Option<Booking>> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            bookings::table
                .filter(bookings::id.eq(id))
                .filter(bookings::user_id.eq(owner_id)),
        )
        .set((&changes, bookings::updated_at.eq(Utc::now())))
        .returning(Booking::as_returning())
        .get_result(&mut conn)
        .optional()?)
    }

    fn delete_owned_booking(&self, id: Uuid, owner_id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(
            bookings::table
                .filter(bookings::id.eq(id))
                .filter(bookings::user_id.eq(owner_id)),
        )
        .execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn list_messages(&self, booking_id: Uuid) -> StoreResult<Vec<BookingMessage>> {
        let mut conn = self.conn()?;
        Ok(booking_messages::table
            .filter(booking_messages::booking_id.eq(booking_id))
            .order((booking_messages::created_at.asc(), booking_messages::id.asc()))
            .select(BookingMessage::as_select())
            .load(&mut conn)?)
    }

    fn insert_message(&self, message: NewBookingMessage) -> StoreResult<BookingMessage> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(booking_messages::table)
            .values(&message)
            .returning(BookingMessage::as_returning())
            .get_result(&mut conn)?)
    }
}

impl AlbumStore for PgStore {
    fn insert_album(&self, album: NewAlbum) -> StoreResult<Album> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(albums::table)
            .values(&album)
            .returning(Album::as_returning())
            .get_result(&mut conn)?)
    }

    fn find_album(&self, id: Uuid) -> StoreResult<Option<Album>> {
        let mut conn = self.conn()?;
        Ok(albums::table
            .find(id)
            .select(Album::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn find_owned_album(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Album>> {
        let mut conn = self.conn()?;
        Ok(albums::table
            .filter(albums::id.eq(id))
            .filter(albums::user_id.eq(owner_id))
            .select(Album::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn list_albums(&self, owner_id: Uuid) -> StoreResult<Vec<Album>> {
        let mut conn = self.conn()?;
        Ok(albums::table
            .filter(albums::user_id.eq(owner_id))
            .order(albums::created_at.desc())
            .select(Album::as_select())
            .load(&mut conn)?)
    }

    fn update_owned_album(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: AlbumChanges,
    ) -> StoreResult<Option<Album>> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            albums::table
                .filter(albums::id.eq(id))
                .filter(albums::user_id.eq(owner_id)),
        )
        .set((&changes, albums::updated_at.eq(Utc::now())))
        .returning(Album::as_returning())
        .get_result(&mut conn)
        .optional()?)
    }

    fn delete_owned_album(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Vec<Image>>> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let album: Option<Album> = albums::table
                .filter(albums::id.eq(id))
                .filter(albums::user_id.eq(owner_id))
                .select(Album::as_select())
                .for_update()
                .first(conn)
                .optional()?;

            if album.is_none() {
                return Ok(None);
            }

            let removed: Vec<Image> = images::table
                .filter(images::album_id.eq(id))
                .select(Image::as_select())
                .load(conn)?;

            diesel::delete(albums::table.find(id)).execute(conn)?;

            Ok(Some(removed))
        })
    }

    fn list_images(&self, album_id: Uuid) -> StoreResult<Vec<Image>> {
        let mut conn = self.conn()?;
        Ok(images::table
            .filter(images::album_id.eq(album_id))
            .order((images::created_at.asc(), images::id.asc()))
            .select(Image::as_select())
            .load(&mut conn)?)
    }

    fn insert_image(&self, image: NewImage) -> StoreResult<Image> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(images::table)
            .values(&image)
            .returning(Image::as_returning())
            .get_result(&mut conn)?)
    }

    fn delete_owned_image(
        &self,
        album_id: Uuid,
        image_id: Uuid,
        owner_id: Uuid,
    ) -> StoreResult<Option<Image>> {
        let mut conn = self.conn()?;
        Ok(diesel::delete(
            images::table
                .filter(images::id.eq(image_id))
                .filter(images::album_id.eq(album_id))
                .filter(images::user_id.eq(owner_id)),
        )
        .returning(Image::as_returning())
        .get_result(&mut conn)
        .optional()?)
    }

    fn image_storage_keys(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn()?;
        Ok(images::table
            .select(images::storage_key)
            .load(&mut conn)?)
    }
}

impl LinkStore for PgStore {
    fn list_links(&self, owner_id: Uuid) -> StoreResult<Vec<CustomLink>> {
        let mut conn = self.conn()?;
        Ok(custom_links::table
            .filter(custom_links::user_id.eq(owner_id))
            .order((custom_links::position.asc(), custom_links::created_at.asc()))
            .select(CustomLink::as_select())
            .load(&mut conn)?)
    }

    fn next_link_position(&self, owner_id: Uuid) -> StoreResult<i32> {
        let mut conn = self.conn()?;
        let highest: Option<i32> = custom_links::table
            .filter(custom_links::user_id.eq(owner_id))
            .select(max(custom_links::position))
            .first(&mut conn)?;
        Ok(highest.map(|position| position + 1).unwrap_or(0))
    }

    fn insert_link(&self, link: NewCustomLink) -> StoreResult<CustomLink> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(custom_links::table)
            .values(&link)
            .returning(CustomLink::as_returning())
            .get_result(&mut conn)?)
    }

    fn update_owned_link(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: CustomLinkChanges,
    ) -> StoreResult<Option<CustomLink>> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            custom_links::table
                .filter(custom_links::id.eq(id))
                .filter(custom_links::user_id.eq(owner_id)),
        )
        .set((&changes, custom_links::updated_at.eq(Utc::now())))
        .returning(CustomLink::as_returning())
        .get_result(&mut conn)
        .optional()?)
    }

    fn delete_owned_link(&self, id: Uuid, owner_id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(
            custom_links::table
                .filter(custom_links::id.eq(id))
                .filter(custom_links::user_id.eq(owner_id)),
        )
        .execute(&mut conn)?;
        Ok(deleted > 0)
    }
}
