//! Cached, rate-limited access to a remote game-data API.
//!
//! The service wraps the provider's REST API behind a [`ResourceManager`]
//! that deduplicates concurrent fetches, throttles requests against the
//! provider's per-second and per-hour caps, refreshes OAuth2 client
//! credentials before they expire, and persists fetched payloads to a local
//! binary store honoring server-supplied cache lifetimes.
//!
//! [`ResourceManager`]: crate::resources::ResourceManager

pub mod api;
pub mod caching;
pub mod config;
pub mod logging;
pub mod resources;
pub mod types;
pub mod utils;
