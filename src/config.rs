use std::env;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_JWT_AUDIENCE: &str = "authenticated";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub max_upload_bytes: usize,
    pub database_url: Option<String>,
    pub database_max_pool_size: u32,
    pub run_migrations: bool,
    pub auth: Option<AuthConfig>,
    pub storage: Option<StorageConfig>,
}

/// How bearer tokens are checked against the identity provider.
#[derive(Clone, Debug)]
pub enum AuthConfig {
    /// Verify the provider's HS256 tokens locally with the project secret.
    Jwt { secret: String, audience: String },
    /// Ask the provider's `/auth/v1/user` endpoint about every token.
    Remote { base_url: String, anon_key: String },
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub public_base_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let cors_allowed_origin = non_empty_var("CORS_ALLOWED_ORIGIN");
        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .map(|value| value.parse())
            .transpose()
            .context("MAX_UPLOAD_BYTES must be an integer")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let database_url = non_empty_var("DATABASE_URL");
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let run_migrations = env::var("RUN_MIGRATIONS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let auth = if let Some(secret) = non_empty_var("SUPABASE_JWT_SECRET") {
            Some(AuthConfig::Jwt {
                secret,
                audience: env::var("SUPABASE_JWT_AUDIENCE")
                    .unwrap_or_else(|_| DEFAULT_JWT_AUDIENCE.to_string()),
            })
        } else {
            match (non_empty_var("SUPABASE_URL"), non_empty_var("SUPABASE_ANON_KEY")) {
                (Some(base_url), Some(anon_key)) => Some(AuthConfig::Remote { base_url, anon_key }),
                _ => None,
            }
        };

        let storage = match (non_empty_var("S3_BUCKET"), non_empty_var("STORAGE_PUBLIC_URL")) {
            (Some(bucket), Some(public_base_url)) => Some(StorageConfig {
                bucket,
                region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                endpoint_url: non_empty_var("AWS_ENDPOINT_URL"),
                access_key_id: non_empty_var("AWS_ACCESS_KEY_ID"),
                secret_access_key: non_empty_var("AWS_SECRET_ACCESS_KEY"),
                public_base_url,
            }),
            _ => None,
        };

        Ok(Self {
            server_host,
            server_port,
            cors_allowed_origin,
            max_upload_bytes,
            database_url,
            database_max_pool_size,
            run_migrations,
            auth,
            storage,
        })
    }

    /// Names of the required settings that are absent. Any entry here means
    /// the server only answers "not configured".
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.database_url.is_none() {
            missing.push("DATABASE_URL");
        }
        if self.auth.is_none() {
            missing.push("SUPABASE_JWT_SECRET or SUPABASE_URL + SUPABASE_ANON_KEY");
        }
        if self.storage.is_none() {
            missing.push("S3_BUCKET + STORAGE_PUBLIC_URL");
        }
        missing
    }

    pub fn redacted_database_url(&self) -> String {
        self.database_url
            .as_deref()
            .map(redact_database_url)
            .unwrap_or_else(|| "<unset>".to_string())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
