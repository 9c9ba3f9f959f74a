use std::error::Error;
use std::time::Duration;

use thiserror::Error;

/// An error that happens when fetching a resource from the remote provider.
///
/// Every waiter coalesced onto the same in-flight fetch observes the same
/// value of this error, so it must stay cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The resource was not found at the remote provider.
    #[error("not found")]
    NotFound,
    /// The resource could not be fetched due to missing permissions.
    ///
    /// The attached string contains the provider's response.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The request did not complete within the configured deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The resource could not be fetched due to another problem, like
    /// connection loss, DNS resolution, or a 5xx server response.
    #[error("download failed: {0}")]
    DownloadError(String),
    /// The provider rejected our client credentials, or the token response
    /// did not have the expected shape.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    /// The resource was fetched successfully, but its body does not decode
    /// into the expected shape.
    #[error("malformed: {0}")]
    Malformed(String),
    /// An unexpected error in the service itself.
    #[error("internal error")]
    InternalError,
}

impl From<std::io::Error> for CacheError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::from_std_error(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(error: reqwest::Error) -> Self {
        Self::download_error(&error)
    }
}

impl CacheError {
    /// Flattens an error chain into the innermost cause, which tends to be
    /// the only actionable part of transport errors.
    fn download_error(mut error: &dyn Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        Self::DownloadError(error.to_string())
    }

    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }
}

/// The result of fetching a resource: the value, or the reason it could not
/// be fetched or is otherwise unusable.
pub type CacheContents<T = ()> = Result<T, CacheError>;
