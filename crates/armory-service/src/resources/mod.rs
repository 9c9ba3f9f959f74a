//! Cached access to remote provider resources.
//!
//! [`ResourceManager`] is the only entry point consumers use. A `get` call
//! walks the cache layers in order: the in-memory resource cache, then the
//! disk cache, and only then a rate-limited, credential-bearing network
//! fetch whose result populates both layers. Concurrent requests for the
//! same key coalesce onto a single fetch, and every waiter observes the
//! identical outcome.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api::{ApiClient, CacheSettings};
use crate::caching::{
    CacheContents, CacheError, CacheKey, DiskCache, DiskRecord, Payload, ResourceCache,
    SingleFlight,
};
use crate::config::Config;
use crate::types::{ApiNamespace, ResourceLocation};

mod realm;

pub use realm::{Realm, RealmEntry, RealmKind, RealmRegion};

/// A handle to a cached resource value.
pub type ResourceHandle<R> = crate::caching::CacheHandle<CacheKey, R>;

/// A resource kind fetchable from the provider API.
///
/// Describes one REST endpoint family: where it lives, which namespace it
/// is served from, and how responses unwrap into the typed value.
pub trait ApiResource:
    Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Endpoint path segment, doubling as the disk cache category.
    const CATEGORY: &'static str;

    /// Namespace family the endpoint is served from.
    const NAMESPACE: ApiNamespace;

    /// Field of the response object holding the payload, if it is wrapped.
    const OUTPUT_FIELD: Option<&'static str> = None;

    /// Request URL for one named resource.
    fn api_url(location: &ResourceLocation, name: &str) -> String {
        format!(
            "{}/{}/wow/{}/{}?locale=en_US",
            location.host,
            Self::NAMESPACE.path_root(),
            Self::CATEGORY,
            name
        )
    }
}

impl ApiResource for Vec<RealmEntry> {
    const CATEGORY: &'static str = "realm";
    const NAMESPACE: ApiNamespace = ApiNamespace::Dynamic;
    const OUTPUT_FIELD: Option<&'static str> = Some("realms");
}

impl ApiResource for Realm {
    const CATEGORY: &'static str = "realm";
    const NAMESPACE: ApiNamespace = ApiNamespace::Dynamic;
}

/// The fetch pipeline for one resource kind.
struct ResourceFetcher<R: ApiResource> {
    api: Arc<ApiClient>,
    cache: Arc<ResourceCache<CacheKey, R>>,
    disk: Option<Arc<DiskCache<R>>>,
    inflight: SingleFlight<ResourceHandle<R>>,
}

impl<R: ApiResource> Clone for ResourceFetcher<R> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            cache: Arc::clone(&self.cache),
            disk: self.disk.clone(),
            inflight: self.inflight.clone(),
        }
    }
}

impl<R: ApiResource> ResourceFetcher<R> {
    fn new(api: Arc<ApiClient>, cache_dir: Option<&Path>) -> Self {
        Self {
            api,
            cache: Arc::new(ResourceCache::new()),
            disk: cache_dir.map(|root| Arc::new(DiskCache::new(root.to_owned(), R::CATEGORY))),
            inflight: SingleFlight::new(),
        }
    }

    /// Returns a handle to the resource, fetching it over the network at
    /// most once per overlapping burst of concurrent requests.
    async fn get(
        &self,
        location: &ResourceLocation,
        name: &str,
    ) -> CacheContents<ResourceHandle<R>> {
        let key = CacheKey::new(location, R::NAMESPACE, R::CATEGORY, name);

        let this = self.clone();
        let task_key = key.clone();
        let location = location.clone();
        let name = name.to_owned();
        self.inflight
            .fetch(key, async move {
                this.lookup_or_fetch(task_key, &location, &name).await
            })
            .await
    }

    async fn lookup_or_fetch(
        &self,
        key: CacheKey,
        location: &ResourceLocation,
        name: &str,
    ) -> CacheContents<ResourceHandle<R>> {
        if let Some(handle) = self.cache.find(&key) {
            tracing::trace!(%key, "in-memory cache hit");
            return Ok(handle);
        }

        if let Some(handle) = self.lookup_disk(&key, location, name) {
            tracing::trace!(%key, "disk cache hit");
            return Ok(handle);
        }

        self.fetch_remote(key, location, name).await
    }

    fn lookup_disk(
        &self,
        key: &CacheKey,
        location: &ResourceLocation,
        name: &str,
    ) -> Option<ResourceHandle<R>> {
        let disk = self.disk.as_ref()?;
        let record = disk.load(location, name)?;

        match record.payload {
            Payload::Typed(value) => {
                let (_, handle) = self.cache.try_emplace(key.clone(), || value);
                Some(handle)
            }
            // A previous fetch failed to decode. Retry the decode against
            // the stored bytes; when it still fails, fall through to a
            // fresh network fetch.
            Payload::Raw(bytes) => match decode_payload::<R>(&bytes) {
                Ok(value) => {
                    let (_, handle) = self.cache.try_emplace(key.clone(), || value);
                    Some(handle)
                }
                Err(err) => {
                    tracing::warn!(%key, error = %err, "stored raw payload still does not decode");
                    None
                }
            },
        }
    }

    async fn fetch_remote(
        &self,
        key: CacheKey,
        location: &ResourceLocation,
        name: &str,
    ) -> CacheContents<ResourceHandle<R>> {
        let url = R::api_url(location, name);
        let namespace = location.namespace(R::NAMESPACE);
        let resource = self.api.get(&url, &namespace).await?;

        let cache_control = resource.cache_control;
        let now = SystemTime::now();
        // The reported Age approximates how long the response sat in the
        // provider's own caches; missing Age means validated at fetch time.
        let last_updated = cache_control
            .age
            .and_then(|age| now.checked_sub(age))
            .unwrap_or(now);

        match decode_payload::<R>(&resource.body) {
            Ok(value) => {
                let (_, handle) = self.cache.try_emplace(key, || value.clone());
                // Without a max-age the resource is not cacheable; the
                // record is still written, but expires on arrival.
                let expires_at = match cache_control.max_age {
                    Some(max_age) => last_updated.checked_add(max_age),
                    None => Some(last_updated),
                };
                self.persist(
                    location,
                    name,
                    DiskRecord {
                        last_updated,
                        expires_at,
                        build: 0,
                        payload: Payload::Typed(value),
                    },
                    &cache_control,
                );
                Ok(handle)
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "failed to decode fetched resource, keeping raw body");
                // Raw fallback records never expire: their whole point is
                // to allow a later decode attempt without a re-fetch.
                self.persist(
                    location,
                    name,
                    DiskRecord {
                        last_updated,
                        expires_at: None,
                        build: 0,
                        payload: Payload::Raw(resource.body),
                    },
                    &cache_control,
                );
                Err(err)
            }
        }
    }

    fn persist(
        &self,
        location: &ResourceLocation,
        name: &str,
        record: DiskRecord<R>,
        cache_control: &CacheSettings,
    ) {
        let Some(disk) = self.disk.as_ref() else {
            return;
        };
        if cache_control.no_store {
            tracing::debug!("provider forbids storing this resource");
            return;
        }
        if let Err(err) = disk.save(location, name, &record) {
            tracing::error!(
                error = &err as &dyn std::error::Error,
                "failed to persist resource to the disk cache",
            );
        }
    }
}

fn decode_payload<R: ApiResource>(body: &[u8]) -> CacheContents<R> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let value = match R::OUTPUT_FIELD {
        Some(field) => value
            .get(field)
            .cloned()
            .ok_or_else(|| CacheError::Malformed(format!("response is missing the `{field}` field")))?,
        None => value,
    };
    Ok(serde_json::from_value(value)?)
}

/// Entry point for cached provider resources.
pub struct ResourceManager {
    api: Arc<ApiClient>,
    realms: ResourceFetcher<Vec<RealmEntry>>,
    realm: ResourceFetcher<Realm>,
}

impl ResourceManager {
    pub fn new(config: &Config) -> Self {
        let api = Arc::new(ApiClient::new(config));
        let cache_dir = config.cache_dir.as_deref();

        Self {
            realms: ResourceFetcher::new(Arc::clone(&api), cache_dir),
            realm: ResourceFetcher::new(Arc::clone(&api), cache_dir),
            api,
        }
    }

    /// Eagerly authenticates against the provider.
    pub async fn start(&self) -> CacheContents<()> {
        self.api.start().await
    }

    /// The realm index of a region.
    pub async fn get_realms(
        &self,
        location: &ResourceLocation,
    ) -> CacheContents<ResourceHandle<Vec<RealmEntry>>> {
        self.realms.get(location, "index").await
    }

    /// A single realm by slug.
    pub async fn get_realm(
        &self,
        location: &ResourceLocation,
        slug: &str,
    ) -> CacheContents<ResourceHandle<Realm>> {
        self.realm.get(location, slug).await
    }
}
