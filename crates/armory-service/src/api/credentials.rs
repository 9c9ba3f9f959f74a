use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use url::Url;

use crate::caching::{CacheContents, CacheError};

/// Minimum remaining token lifetime below which a refresh happens first.
const EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// A bearer token obtained through the OAuth2 client-credentials flow.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Instant,
    pub scope: Option<String>,
}

impl Credentials {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now + EXPIRY_MARGIN
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: u64,
    #[serde(default)]
    scope: Option<String>,
}

/// Holds the provider token and refreshes it on demand before it expires.
///
/// Validity is checked under a shared lock; the refresh itself runs under
/// the exclusive lock and re-checks first, so a thundering herd of expired
/// callers results in exactly one token request. Callers that were blocked
/// on the exclusive lock observe the freshly stored token, or retry the
/// refresh themselves if the winning request failed.
pub struct CredentialManager {
    client: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    current: RwLock<Option<Credentials>>,
}

impl CredentialManager {
    pub fn new(
        client: reqwest::Client,
        token_url: Url,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            client,
            token_url,
            client_id,
            client_secret,
            current: RwLock::new(None),
        }
    }

    /// Returns valid credentials, refreshing them first when the remaining
    /// lifetime is below the safety margin.
    pub async fn ensure_valid(&self) -> CacheContents<Credentials> {
        {
            let current = self.current.read().await;
            if let Some(credentials) = current.as_ref() {
                if credentials.is_fresh(Instant::now()) {
                    return Ok(credentials.clone());
                }
            }
        }

        let mut current = self.current.write().await;
        if let Some(credentials) = current.as_ref() {
            if credentials.is_fresh(Instant::now()) {
                return Ok(credentials.clone());
            }
        }

        let fresh = self.request_access().await?;
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    async fn request_access(&self) -> CacheContents<Credentials> {
        tracing::debug!("requesting a fresh authorization token");

        let response = self
            .client
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|err| CacheError::AuthenticationFailed(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(CacheError::AuthenticationFailed(format!(
                "token endpoint returned {status}: {details}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| CacheError::AuthenticationFailed(err.to_string()))?;
        let expires_in = Duration::from_secs(token.expires_in);
        tracing::info!(?expires_in, "authorization token obtained");

        Ok(Credentials {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_at: Instant::now() + expires_in,
            scope: token.scope,
        })
    }
}
