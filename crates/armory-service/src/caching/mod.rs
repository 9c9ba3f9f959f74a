//! # Caching infrastructure
//!
//! Caching is front and center in this service: every remote resource is
//! expensive to fetch, both because of network latency and because the
//! provider imposes hard rate limits. This module contains the layers that
//! keep repeated work off the wire, and the central [`CacheError`] type.
//!
//! ## Cache Layers
//!
//! A resource request goes through the following layers, top to bottom:
//!
//! - The [`SingleFlight`] table coalesces concurrent requests for the same
//!   [`CacheKey`] into one underlying fetch; every waiter observes the
//!   identical result.
//! - The in-memory [`ResourceCache`] hands out shared [`CacheHandle`]s to
//!   values that are currently alive. A value lives exactly as long as at
//!   least one handle to it exists; freed slots are reused in place.
//! - The [`DiskCache`] persists fetched payloads in a binary format with a
//!   provider-supplied validity window. Corrupt, truncated or expired files
//!   are indistinguishable from absent ones: always a miss, never an error.
//!
//! Only a miss in all three layers reaches the network, and then only after
//! rate-limiter admission with a valid bearer token.
//!
//! ## Failure policy
//!
//! Fetch failures short of an internal bug are described by [`CacheError`]
//! and delivered identically to every coalesced waiter. Undecodable
//! response bodies still end up on disk as raw bytes, so a later process
//! (say, one with a fixed decoder) can retry without spending another
//! rate-limited request.

mod cache_error;
mod cache_key;
mod disk;
mod resource_cache;
mod single_flight;

pub use cache_error::{CacheContents, CacheError};
pub use cache_key::CacheKey;
pub use disk::{DiskCache, DiskRecord, Payload};
pub use resource_cache::{CacheHandle, ResourceCache, SharedEntry};
pub use single_flight::SingleFlight;
