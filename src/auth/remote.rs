use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use super::{AuthError, Identity, TokenVerifier};

/// Asks the identity provider who owns a token (`GET /auth/v1/user`).
#[derive(Clone)]
pub struct RemoteVerifier {
    client: Client,
    user_endpoint: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct RemoteUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

impl RemoteVerifier {
    pub fn new(client: Client, base_url: &str, anon_key: impl Into<String>) -> Self {
        Self {
            client,
            user_endpoint: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
        }
    }
}

#[async_trait]
impl TokenVerifier for RemoteVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let response = self
            .client
            .get(&self.user_endpoint)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| AuthError::Upstream(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let user: RemoteUser = response
                    .json()
                    .await
                    .map_err(|err| AuthError::Upstream(format!("invalid user payload: {err}")))?;
                Ok(Identity {
                    id: user.id,
                    email: user.email.filter(|email| !email.trim().is_empty()),
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidToken(
                format!("identity provider answered {}", response.status()),
            )),
            status => Err(AuthError::Upstream(format!(
                "identity provider answered {status}"
            ))),
        }
    }
}
