use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::api::RateLimits;

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the service.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// OAuth2 client credentials used against the provider.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// The API client id.
    pub client_id: String,
    /// The API client secret.
    pub client_secret: String,
    /// The token endpoint of the provider.
    pub token_url: Url,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        CredentialsConfig {
            client_id: env::var("BNET_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("BNET_CLIENT_SECRET").unwrap_or_default(),
            token_url: "https://oauth.battle.net/token".parse().unwrap(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory to store cached resources in.
    ///
    /// Leaving this as None will disable the disk cache.
    pub cache_dir: Option<PathBuf>,

    /// Credentials for the provider API.
    pub credentials: CredentialsConfig,

    /// Admission caps imposed by the provider.
    pub rate_limits: RateLimits,

    /// The timeout for establishing a connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// The overall timeout for one request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache_dir: None,
            credentials: CredentialsConfig::default(),
            rate_limits: RateLimits::default(),
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
            logging: Logging::default(),
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_file() {
        let result = Config::from_reader("".as_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let yaml = "cache_dir: /tmp/armory\n";
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();

        assert_eq!(cfg.cache_dir, Some(PathBuf::from("/tmp/armory")));
        assert_eq!(cfg.rate_limits.max_per_second, 80);
        assert_eq!(cfg.rate_limits.max_per_hour, 32_000);
        assert_eq!(cfg.connect_timeout, Duration::from_millis(500));
        assert_eq!(cfg.logging.level, LevelFilter::INFO);
    }

    #[test]
    fn test_overrides() {
        let yaml = r#"
            credentials:
              client_id: my-client
              client_secret: my-secret
            rate_limits:
              max_per_second: 10
              max_per_hour: 500
            request_timeout: 2m
            logging:
              level: debug
              format: json
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();

        assert_eq!(cfg.credentials.client_id, "my-client");
        assert_eq!(cfg.rate_limits.max_per_second, 10);
        assert_eq!(cfg.rate_limits.max_per_hour, 500);
        assert_eq!(cfg.request_timeout, Duration::from_secs(120));
        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_level() {
        let yaml = "logging:\n  level: verbose\n";
        assert!(Config::from_reader(yaml.as_bytes()).is_err());
    }
}
