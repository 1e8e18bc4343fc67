pub mod jwt;
pub mod remote;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub use jwt::JwtVerifier;
pub use remote::RemoteVerifier;

/// Identity resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Why a token was refused. Callers only ever see 401; the variants exist so
/// the logs can tell a bad token from an unreachable identity provider.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed bearer token")]
    MissingToken,
    #[error("token rejected: {0}")]
    InvalidToken(String),
    #[error("identity provider unavailable: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::from(AuthError::MissingToken))?;

        let identity = match state.verifier.verify(bearer.token()).await {
            Ok(identity) => identity,
            Err(err @ AuthError::Upstream(_)) => {
                warn!(error = %err, "identity provider call failed");
                return Err(err.into());
            }
            Err(err) => {
                debug!(error = %err, "bearer token refused");
                return Err(err.into());
            }
        };

        Ok(AuthenticatedUser {
            user_id: identity.id,
            email: identity.email,
        })
    }
}
