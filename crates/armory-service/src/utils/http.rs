use std::time::Duration;

use crate::config::Config;

/// Creates the shared [`reqwest::Client`] with the configured timeouts.
pub fn create_client(config: &Config) -> reqwest::Client {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}
