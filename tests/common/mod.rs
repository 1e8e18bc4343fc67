use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use folio::access::EmailClaimant;
use folio::auth::JwtVerifier;
use folio::config::{AppConfig, AuthConfig, StorageConfig};
use folio::models::{
    Album, AlbumChanges, Booking, BookingChanges, BookingMessage, ClientBooking, CustomLink,
    CustomLinkChanges, Image, NewAlbum, NewBooking, NewBookingMessage, NewCustomLink, NewImage,
    NewProfile, Profile, ProfileChanges,
};
use folio::routes;
use folio::state::AppState;
use folio::storage::{join_public_url, ObjectInfo, ObjectStorage};
use folio::store::{
    AlbumStore, BookingStore, LinkStore, ProfileStore, StoreError, StoreResult,
};
use http_body_util::BodyExt;
use serde::Serialize;
use serde_json::Value;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret";
pub const TEST_JWT_AUDIENCE: &str = "authenticated";
pub const TEST_PUBLIC_URL: &str = "https://cdn.test/portfolio";

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: tokio::sync::Mutex<HashMap<String, StoredObject>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
            modified_at: Utc::now(),
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let guard = self.objects.lock().await;
        let mut objects: Vec<ObjectInfo> = guard
            .values()
            .filter(|object| object.key.starts_with(prefix))
            .map(|object| ObjectInfo {
                key: object.key.clone(),
                last_modified: Some(object.modified_at),
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn public_url(&self, key: &str) -> String {
        join_public_url(TEST_PUBLIC_URL, key)
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    /// Pretends `key` was written `age` ago.
    #[allow(dead_code)]
    pub async fn backdate(&self, key: &str, age: Duration) {
        let mut guard = self.objects.lock().await;
        if let Some(object) = guard.get_mut(key) {
            object.modified_at = Utc::now() - age;
        }
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

#[derive(Default)]
struct Tables {
    profiles: Vec<Profile>,
    bookings: Vec<Booking>,
    messages: Vec<BookingMessage>,
    albums: Vec<Album>,
    images: Vec<Image>,
    links: Vec<CustomLink>,
}

/// In-memory stand-in for Postgres. Rows are kept in insertion order and the
/// cascades, cover trigger and unique username index are emulated.
#[derive(Default)]
pub struct FakeStore {
    tables: Mutex<Tables>,
    #[allow(dead_code)]
    pub fail_image_inserts: std::sync::atomic::AtomicBool,
}

impl FakeStore {
    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|err| StoreError::Pool(err.to_string()))
    }

    #[allow(dead_code)]
    pub fn message_count(&self) -> usize {
        self.tables().map(|t| t.messages.len()).unwrap_or_default()
    }

    #[allow(dead_code)]
    pub fn image_count(&self) -> usize {
        self.tables().map(|t| t.images.len()).unwrap_or_default()
    }
}

fn username_taken(tables: &Tables, username: &str, except: Uuid) -> bool {
    tables
        .profiles
        .iter()
        .any(|p| p.id != except && p.username.to_lowercase() == username.to_lowercase())
}

fn apply<T>(target: &mut T, change: Option<T>) {
    if let Some(value) = change {
        *target = value;
    }
}

impl ProfileStore for FakeStore {
    fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.tables()?.profiles.iter().find(|p| p.id == id).cloned())
    }

    fn find_profile_by_username(&self, username: &str) -> StoreResult<Option<Profile>> {
        let needle = username.to_lowercase();
        Ok(self
            .tables()?
            .profiles
            .iter()
            .find(|p| p.username.to_lowercase() == needle)
            .cloned())
    }

    fn insert_profile(&self, profile: NewProfile) -> StoreResult<Profile> {
        let mut tables = self.tables()?;
        if tables.profiles.iter().any(|p| p.id == profile.id)
            || username_taken(&tables, &profile.username, profile.id)
        {
            return Err(StoreError::Conflict("username already taken".into()));
        }
        let now = Utc::now();
        let row = Profile {
            id: profile.id,
            username: profile.username,
            display_name: profile.display_name,
            bio: profile.bio,
            avatar_url: profile.avatar_url,
            created_at: now,
            updated_at: now,
        };
        tables.profiles.push(row.clone());
        Ok(row)
    }

    fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<Profile>> {
        let mut tables = self.tables()?;
        if let Some(username) = changes.username.as_deref() {
            if username_taken(&tables, username, id) {
                return Err(StoreError::Conflict("username already taken".into()));
            }
        }
        let Some(row) = tables.profiles.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        apply(&mut row.username, changes.username);
        apply(&mut row.display_name, changes.display_name);
        apply(&mut row.bio, changes.bio);
        apply(&mut row.avatar_url, changes.avatar_url);
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }
}

impl BookingStore for FakeStore {
    fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        let now = Utc::now();
        let row = Booking {
            id: booking.id,
            user_id: booking.user_id,
            name: booking.name,
            email: booking.email,
            job_type: booking.job_type,
            dates: booking.dates,
            location: booking.location,
            pay_rate: booking.pay_rate,
            details: booking.details,
            status: booking.status,
            created_at: now,
            updated_at: now,
        };
        self.tables()?.bookings.push(row.clone());
        Ok(row)
    }

    fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables()?.bookings.iter().find(|b| b.id == id).cloned())
    }

    fn find_owned_booking(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self
            .tables()?
            .bookings
            .iter()
            .find(|b| b.id == id && b.user_id == owner_id)
            .cloned())
    }

    fn list_owned_bookings(&self, owner_id: Uuid) -> StoreResult<Vec<Booking>> {
        Ok(self
            .tables()?
            .bookings
            .iter()
            .rev()
            .filter(|b| b.user_id == owner_id)
            .cloned()
            .collect())
    }

    fn list_client_bookings(&self, normalized_email: &str) -> StoreResult<Vec<ClientBooking>> {
        let tables = self.tables()?;
        Ok(tables
            .bookings
            .iter()
            .rev()
            .filter(|b| b.email.trim().to_lowercase() == normalized_email)
            .map(|b| {
                let profile = tables.profiles.iter().find(|p| p.id == b.user_id);
                ClientBooking {
                    booking: b.clone(),
                    model_name: profile.and_then(|p| p.display_name.clone()),
                    model_username: profile.map(|p| p.username.clone()),
                }
            })
            .collect())
    }

    fn update_owned_booking(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: BookingChanges,
    ) -> StoreResult<Option<Booking>> {
        let mut tables = self.tables()?;
        let Some(row) = tables
            .bookings
            .iter_mut()
            .find(|b| b.id == id && b.user_id == owner_id)
        else {
            return Ok(None);
        };
        apply(&mut row.name, changes.name);
        apply(&mut row.email, changes.email);
        apply(&mut row.job_type, changes.job_type);
        apply(&mut row.dates, changes.dates);
        apply(&mut row.location, changes.location);
        apply(&mut row.pay_rate, changes.pay_rate);
        apply(&mut row.details, changes.details);
        apply(&mut row.status, changes.status);
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    fn delete_owned_booking(&self, id: Uuid, owner_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables()?;
        let before = tables.bookings.len();
        tables
            .bookings
            .retain(|b| !(b.id == id && b.user_id == owner_id));
        let deleted = tables.bookings.len() != before;
        if deleted {
            tables.messages.retain(|m| m.booking_id != id);
        }
        Ok(deleted)
    }

    fn list_messages(&self, booking_id: Uuid) -> StoreResult<Vec<BookingMessage>> {
        Ok(self
            .tables()?
            .messages
            .iter()
            .filter(|m| m.booking_id == booking_id)
            .cloned()
            .collect())
    }

    fn insert_message(&self, message: NewBookingMessage) -> StoreResult<BookingMessage> {
        let mut tables = self.tables()?;
        if !tables.bookings.iter().any(|b| b.id == message.booking_id) {
            return Err(StoreError::NotFound);
        }
        let row = BookingMessage {
            id: message.id,
            booking_id: message.booking_id,
            sender_kind: message.sender_kind,
            sender_id: message.sender_id,
            body: message.body,
            created_at: Utc::now(),
        };
        tables.messages.push(row.clone());
        Ok(row)
    }
}

impl AlbumStore for FakeStore {
    fn insert_album(&self, album: NewAlbum) -> StoreResult<Album> {
        let now = Utc::now();
        let row = Album {
            id: album.id,
            user_id: album.user_id,
            title: album.title,
            description: album.description,
            cover_image_id: None,
            created_at: now,
            updated_at: now,
        };
        self.tables()?.albums.push(row.clone());
        Ok(row)
    }

    fn find_album(&self, id: Uuid) -> StoreResult<Option<Album>> {
        Ok(self.tables()?.albums.iter().find(|a| a.id == id).cloned())
    }

    fn find_owned_album(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Album>> {
        Ok(self
            .tables()?
            .albums
            .iter()
            .find(|a| a.id == id && a.user_id == owner_id)
            .cloned())
    }

    fn list_albums(&self, owner_id: Uuid) -> StoreResult<Vec<Album>> {
        Ok(self
            .tables()?
            .albums
            .iter()
            .rev()
            .filter(|a| a.user_id == owner_id)
            .cloned()
            .collect())
    }

    fn update_owned_album(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: AlbumChanges,
    ) -> StoreResult<Option<Album>> {
        let mut tables = self.tables()?;
        let Some(row) = tables
            .albums
            .iter_mut()
            .find(|a| a.id == id && a.user_id == owner_id)
        else {
            return Ok(None);
        };
        apply(&mut row.title, changes.title);
        apply(&mut row.description, changes.description);
        apply(&mut row.cover_image_id, changes.cover_image_id);
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    fn delete_owned_album(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Vec<Image>>> {
        let mut tables = self.tables()?;
        let before = tables.albums.len();
        tables
            .albums
            .retain(|a| !(a.id == id && a.user_id == owner_id));
        if tables.albums.len() == before {
            return Ok(None);
        }
        let (removed, kept): (Vec<Image>, Vec<Image>) = std::mem::take(&mut tables.images)
            .into_iter()
            .partition(|image| image.album_id == id);
        tables.images = kept;
        Ok(Some(removed))
    }

    fn list_images(&self, album_id: Uuid) -> StoreResult<Vec<Image>> {
        Ok(self
            .tables()?
            .images
            .iter()
            .filter(|i| i.album_id == album_id)
            .cloned()
            .collect())
    }

    fn insert_image(&self, image: NewImage) -> StoreResult<Image> {
        if self
            .fail_image_inserts
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(StoreError::Database("simulated insert failure".into()));
        }
        let mut tables = self.tables()?;
        let Some(album) = tables.albums.iter_mut().find(|a| a.id == image.album_id) else {
            return Err(StoreError::NotFound);
        };
        if album.cover_image_id.is_none() {
            album.cover_image_id = Some(image.id);
        }
        let row = Image {
            id: image.id,
            album_id: image.album_id,
            user_id: image.user_id,
            storage_key: image.storage_key,
            url: image.url,
            caption: image.caption,
            content_type: image.content_type,
            size_bytes: image.size_bytes,
            checksum: image.checksum,
            width: image.width,
            height: image.height,
            created_at: Utc::now(),
        };
        tables.images.push(row.clone());
        Ok(row)
    }

    fn delete_owned_image(
        &self,
        album_id: Uuid,
        image_id: Uuid,
        owner_id: Uuid,
    ) -> StoreResult<Option<Image>> {
        let mut tables = self.tables()?;
        let Some(index) = tables
            .images
            .iter()
            .position(|i| i.id == image_id && i.album_id == album_id && i.user_id == owner_id)
        else {
            return Ok(None);
        };
        let removed = tables.images.remove(index);
        let replacement = tables
            .images
            .iter()
            .find(|i| i.album_id == album_id)
            .map(|i| i.id);
        if let Some(album) = tables.albums.iter_mut().find(|a| a.id == album_id) {
            if album.cover_image_id == Some(image_id) {
                album.cover_image_id = replacement;
            }
        }
        Ok(Some(removed))
    }

    fn image_storage_keys(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .tables()?
            .images
            .iter()
            .map(|i| i.storage_key.clone())
            .collect())
    }
}

impl LinkStore for FakeStore {
    fn list_links(&self, owner_id: Uuid) -> StoreResult<Vec<CustomLink>> {
        let mut links: Vec<CustomLink> = self
            .tables()?
            .links
            .iter()
            .filter(|l| l.user_id == owner_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order between equal positions.
        links.sort_by_key(|l| l.position);
        Ok(links)
    }

    fn next_link_position(&self, owner_id: Uuid) -> StoreResult<i32> {
        Ok(self
            .tables()?
            .links
            .iter()
            .filter(|l| l.user_id == owner_id)
            .map(|l| l.position + 1)
            .max()
            .unwrap_or(0))
    }

    fn insert_link(&self, link: NewCustomLink) -> StoreResult<CustomLink> {
        let now = Utc::now();
        let row = CustomLink {
            id: link.id,
            user_id: link.user_id,
            title: link.title,
            url: link.url,
            icon_url: link.icon_url,
            enabled: link.enabled,
            position: link.position,
            created_at: now,
            updated_at: now,
        };
        self.tables()?.links.push(row.clone());
        Ok(row)
    }

    fn update_owned_link(
        &self,
        id: Uuid,
        owner_id: Uuid,
        changes: CustomLinkChanges,
    ) -> StoreResult<Option<CustomLink>> {
        let mut tables = self.tables()?;
        let Some(row) = tables
            .links
            .iter_mut()
            .find(|l| l.id == id && l.user_id == owner_id)
        else {
            return Ok(None);
        };
        apply(&mut row.title, changes.title);
        apply(&mut row.url, changes.url);
        apply(&mut row.icon_url, changes.icon_url);
        apply(&mut row.enabled, changes.enabled);
        apply(&mut row.position, changes.position);
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    fn delete_owned_link(&self, id: Uuid, owner_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables()?;
        let before = tables.links.len();
        tables
            .links
            .retain(|l| !(l.id == id && l.user_id == owner_id));
        Ok(tables.links.len() != before)
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        cors_allowed_origin: None,
        max_upload_bytes: 64 * 1024,
        database_url: Some("postgres://unused".to_string()),
        database_max_pool_size: 1,
        run_migrations: false,
        auth: Some(AuthConfig::Jwt {
            secret: TEST_JWT_SECRET.to_string(),
            audience: TEST_JWT_AUDIENCE.to_string(),
        }),
        storage: Some(StorageConfig {
            bucket: "test-bucket".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            public_base_url: TEST_PUBLIC_URL.to_string(),
        }),
    }
}

pub struct TestApp {
    #[allow(dead_code)]
    pub state: AppState,
    router: Router,
    store: Arc<FakeStore>,
    storage: Arc<FakeStorage>,
    jwt: JwtVerifier,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(FakeStore::default());
        let storage = Arc::new(FakeStorage::default());
        let jwt = JwtVerifier::new(TEST_JWT_SECRET, TEST_JWT_AUDIENCE);

        let state = AppState::new(
            config,
            store.clone(),
            storage.clone(),
            Arc::new(jwt.clone()),
            Arc::new(EmailClaimant),
        );
        let router = routes::create_router(state.clone());

        Self {
            state,
            router,
            store,
            storage,
            jwt,
        }
    }

    #[allow(dead_code)]
    pub fn store(&self) -> Arc<FakeStore> {
        self.store.clone()
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    /// A token for `user_id`, carrying `email` when given.
    pub fn token_for(&self, user_id: Uuid, email: Option<&str>) -> String {
        self.jwt
            .issue_token(user_id, email, Duration::minutes(15))
            .expect("token signing")
    }

    /// Creates a profile through the API and returns the owner id and token.
    #[allow(dead_code)]
    pub async fn model(&self, username: &str, display_name: &str) -> Result<(Uuid, String)> {
        let user_id = Uuid::new_v4();
        let token = self.token_for(user_id, Some(&format!("{username}@models.test")));
        let response = self
            .put_json(
                "/api/profiles/me",
                &serde_json::json!({ "username": username, "display_name": display_name }),
                Some(&token),
            )
            .await?;
        anyhow::ensure!(
            response.status() == axum::http::StatusCode::CREATED,
            "profile creation failed with status {}",
            response.status()
        );
        Ok((user_id, token))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        self.send(request).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        self.send(request).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        self.send(request).await
    }

    #[allow(dead_code)]
    pub async fn upload_image(
        &self,
        path: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        caption: Option<&str>,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");

        if let Some(caption) = caption {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(b"Content-Disposition: form-data; name=\"caption\"\r\n\r\n");
            body.extend(caption.as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        self.send(request).await
    }

    #[allow(dead_code)]
    pub async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

/// Parses an envelope body into JSON.
pub async fn body_json(response: hyper::Response<Body>) -> Result<Value> {
    let bytes = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[allow(dead_code)]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::new(width, height)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("png encoding");
    bytes
}
