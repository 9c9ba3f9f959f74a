use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use super::cache_key::CacheKey;
use super::{CacheContents, CacheError};

type SharedFetch<V> = Shared<BoxFuture<'static, CacheContents<V>>>;

/// Collapses concurrent fetches for the same key into one underlying task.
///
/// The first caller to register a key spawns its computation; everyone else
/// arriving while it is in flight awaits the same shared result, value or
/// error. The computation runs as its own task, so it proceeds to completion
/// even when every waiter has been cancelled. The in-flight entry is removed
/// the moment the computation fulfills, which keeps the table bounded by the
/// number of concurrently outstanding keys.
pub struct SingleFlight<V> {
    inflight: Arc<Mutex<HashMap<CacheKey, SharedFetch<V>>>>,
}

impl<V> Default for SingleFlight<V> {
    fn default() -> Self {
        Self {
            inflight: Default::default(),
        }
    }
}

impl<V> Clone for SingleFlight<V> {
    fn clone(&self) -> Self {
        Self {
            inflight: Arc::clone(&self.inflight),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> SingleFlight<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Awaits the result for `key`, running `compute` only if no fetch for
    /// that key is currently in flight.
    pub async fn fetch<F>(&self, key: CacheKey, compute: F) -> CacheContents<V>
    where
        F: Future<Output = CacheContents<V>> + Send + 'static,
    {
        let fetch = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(&key) {
                Some(pending) => pending.clone(),
                None => {
                    let table = Arc::clone(&self.inflight);
                    let task_key = key.clone();
                    let task = tokio::spawn(async move {
                        let result = compute.await;
                        table.lock().unwrap().remove(&task_key);
                        result
                    });
                    let fetch = task
                        .map(|result| result.unwrap_or(Err(CacheError::InternalError)))
                        .boxed()
                        .shared();

                    inflight.insert(key, fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::types::{ApiNamespace, GameVersion, Region};

    use super::*;

    fn key(name: &str) -> CacheKey {
        let location = Region::NORTH_AMERICA.location(GameVersion::Retail);
        CacheKey::new(&location, ApiNamespace::Dynamic, "realm", name)
    }

    #[tokio::test]
    async fn test_concurrent_fetches_coalesce() {
        let flight: SingleFlight<u32> = SingleFlight::new();
        let computations = Arc::new(AtomicUsize::new(0));

        let slow = |computations: Arc<AtomicUsize>| async move {
            computations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(42)
        };

        let (a, b) = tokio::join!(
            flight.fetch(key("index"), slow(Arc::clone(&computations))),
            flight.fetch(key("index"), slow(Arc::clone(&computations))),
        );

        assert_eq!(a.unwrap(), 42);
        assert_eq!(b.unwrap(), 42);
        assert_eq!(computations.load(Ordering::SeqCst), 1);
        assert_eq!(flight.len(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flight: SingleFlight<u32> = SingleFlight::new();
        let computations = Arc::new(AtomicUsize::new(0));

        let compute = |computations: Arc<AtomicUsize>| async move {
            computations.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        };

        let (a, b) = tokio::join!(
            flight.fetch(key("index"), compute(Arc::clone(&computations))),
            flight.fetch(key("aegwynn"), compute(Arc::clone(&computations))),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(computations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_all_waiters_observe_the_same_error() {
        let flight: SingleFlight<u32> = SingleFlight::new();

        let failing = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(CacheError::Malformed("nope".into()))
        };

        let (a, b) = tokio::join!(
            flight.fetch(key("index"), failing()),
            flight.fetch(key("index"), failing()),
        );

        assert_eq!(a, Err(CacheError::Malformed("nope".into())));
        assert_eq!(a, b);
        assert_eq!(flight.len(), 0);
    }

    #[tokio::test]
    async fn test_fetch_survives_cancelled_waiters() {
        let flight: SingleFlight<u32> = SingleFlight::new();
        let completions = Arc::new(AtomicUsize::new(0));

        let compute = {
            let completions = Arc::clone(&completions);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                completions.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }
        };

        // Register the fetch, then drop the waiting future before it resolves.
        let waiter = flight.fetch(key("index"), compute);
        tokio::select! {
            biased;
            _ = tokio::time::sleep(Duration::from_millis(1)) => {}
            _ = waiter => panic!("fetch should not resolve this quickly"),
        }

        // The spawned computation keeps running and later callers see it.
        let late = flight
            .fetch(key("index"), async { Ok(0) })
            .await
            .unwrap();
        assert_eq!(late, 7);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }
}
