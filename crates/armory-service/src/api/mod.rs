//! The HTTP boundary to the remote provider.
//!
//! Every request goes through rate-limiter admission first and carries a
//! bearer token that is transparently refreshed when close to expiry.
//! Responses come back as raw bytes together with the caching directives
//! the provider attached, which drive the disk cache validity downstream.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{StatusCode, header};

use crate::caching::{CacheContents, CacheError};
use crate::config::Config;

mod credentials;
mod rate_limit;

pub use credentials::{CredentialManager, Credentials};
pub use rate_limit::{RateLimiter, RateLimits};

/// Caching directives reported by the provider for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSettings {
    pub max_age: Option<Duration>,
    pub age: Option<Duration>,
    pub no_store: bool,
    pub must_revalidate: bool,
    pub public: bool,
    pub private: bool,
}

impl CacheSettings {
    fn from_headers(headers: &header::HeaderMap) -> Self {
        let mut settings = Self::default();

        if let Some(value) = headers
            .get(header::CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
        {
            for directive in value.split(',') {
                let directive = directive.trim();
                if let Some(secs) = directive.strip_prefix("max-age=") {
                    settings.max_age = secs.parse().ok().map(Duration::from_secs);
                } else {
                    match directive {
                        "no-store" => settings.no_store = true,
                        "must-revalidate" => settings.must_revalidate = true,
                        "public" => settings.public = true,
                        "private" => settings.private = true,
                        _ => {}
                    }
                }
            }
        }

        if let Some(value) = headers.get(header::AGE).and_then(|value| value.to_str().ok()) {
            settings.age = value.trim().parse().ok().map(Duration::from_secs);
        }

        settings
    }
}

/// A fetched resource body together with its caching directives.
#[derive(Debug, Clone)]
pub struct RestResource {
    pub body: Vec<u8>,
    pub cache_control: CacheSettings,
}

/// Client for the provider's REST API.
pub struct ApiClient {
    client: reqwest::Client,
    credentials: CredentialManager,
    rate_limiter: Arc<RateLimiter>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        let client = crate::utils::http::create_client(config);
        let credentials = CredentialManager::new(
            client.clone(),
            config.credentials.token_url.clone(),
            config.credentials.client_id.clone(),
            config.credentials.client_secret.clone(),
        );

        Self {
            client,
            credentials,
            rate_limiter: RateLimiter::new(config.rate_limits),
        }
    }

    /// Eagerly obtains the first token, so a misconfigured client id or
    /// secret surfaces at startup instead of on the first fetch.
    pub async fn start(&self) -> CacheContents<()> {
        tracing::info!("initializing communication with the provider API");
        self.credentials.ensure_valid().await?;
        tracing::info!("communication with the provider API established");
        Ok(())
    }

    /// Issues a rate-limited, authenticated GET against `url`.
    pub async fn get(&self, url: &str, namespace: &str) -> CacheContents<RestResource> {
        self.rate_limiter.admit().await;
        let credentials = self.credentials.ensure_valid().await?;

        tracing::debug!(url, namespace, "fetching remote resource");
        let response = self
            .client
            .get(url)
            .header("Battlenet-Namespace", namespace)
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;

        let status = response.status();
        let cache_control = CacheSettings::from_headers(response.headers());

        if status == StatusCode::NOT_FOUND {
            return Err(CacheError::NotFound);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let details = response.text().await.unwrap_or_default();
            return Err(CacheError::PermissionDenied(details));
        }
        if status.as_u16() >= 300 {
            let details = response.text().await.unwrap_or_default();
            return Err(CacheError::DownloadError(format!("HTTP {status}: {details}")));
        }

        let body = response.bytes().await?.to_vec();
        Ok(RestResource {
            body,
            cache_control,
        })
    }
}
