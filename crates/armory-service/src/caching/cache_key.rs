use std::fmt;
use std::sync::Arc;

use crate::types::{ApiNamespace, ResourceLocation};

/// Uniquely identifies one cacheable remote resource.
///
/// The key is the human-readable string `region:namespace:category:name`,
/// e.g. `us:dynamic:realm:index`. It is used both for in-memory lookups and
/// for coalescing concurrent fetches, and it must stay stable: a changed key
/// means a lost cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: Arc<str>,
}

impl CacheKey {
    pub fn new(
        location: &ResourceLocation,
        namespace: ApiNamespace,
        category: &str,
        name: &str,
    ) -> Self {
        let key = format!(
            "{}:{}{}:{}:{}",
            location.region_code,
            namespace.as_str(),
            location.version.namespace_suffix(),
            category,
            name
        );

        Self { key: key.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Protect against:
/// * ".."
/// * absolute paths
/// * ":" (not a threat on POSIX filesystems, but confuses OS X Finder)
pub(crate) fn safe_path_segment(s: &str) -> String {
    s.replace(['.', '/', '\\', ':'], "_")
}
