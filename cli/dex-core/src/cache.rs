//! Shared, TTL-aware cache of resolved catalog records.
//!
//! A [Cache] stores one value per key together with the time it was fetched.
//! Concurrent resolutions of the same key share a single fetch.
//! Failed fetches are never cached.
//!
//! [ItemCache] and [SpeciesCache] bind a [Cache] to the catalog client.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dex_catalog::{
    ClientTrait,
    FetchError,
    ItemDetail,
    ItemId,
    ItemKey,
    RetryPolicy,
    SpeciesMeta,
    retry,
};
use futures::future::{BoxFuture, Shared};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// Details stay fresh for ten minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

type SharedFetch<V> = Shared<BoxFuture<'static, Result<Arc<V>, FetchError>>>;

#[derive(Debug)]
pub struct CacheEntry<V> {
    pub value: Arc<V>,
    pub fetched_at: DateTime<Utc>,
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
        }
    }
}

struct Inner<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    in_flight: DashMap<K, SharedFetch<V>>,
}

pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V> Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.inner.entries.len())
            .field("in_flight", &self.inner.in_flight.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// A `ttl` of zero makes every entry stale immediately.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
            }),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - fetched_at).to_std() {
            Ok(age) => age < self.ttl,
            // fetched "in the future", the clock went backwards
            Err(_) => true,
        }
    }

    /// The cached value, fresh or not.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.inner
            .entries
            .get(key)
            .map(|entry| Arc::clone(&entry.value))
    }

    /// The cached value if it is still fresh.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let now = Utc::now();
        let entry = self.inner.entries.get(key)?;
        self.is_fresh(entry.fetched_at, now)
            .then(|| Arc::clone(&entry.value))
    }

    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.inner.entries.insert(key, CacheEntry {
            value: Arc::clone(&value),
            fetched_at: Utc::now(),
        });
        value
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inner.in_flight.contains_key(key)
    }

    /// Return the fresh value for `key`, or fetch it with `fetch`.
    ///
    /// While a fetch for `key` is outstanding, other callers wait for it
    /// instead of starting their own. If the shared fetch is cancelled by the
    /// caller that started it, waiters that are still interested start a new
    /// one.
    pub async fn resolve_with<F, Fut>(
        &self,
        key: K,
        cancel: &CancellationToken,
        fetch: F,
    ) -> Result<Arc<V>, FetchError>
    where
        F: Fn(CancellationToken) -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        loop {
            if let Some(value) = self.get(&key) {
                return Ok(value);
            }
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let shared = match self.inner.in_flight.entry(key.clone()) {
                Entry::Occupied(entry) => {
                    trace!(%key, "joining outstanding fetch");
                    entry.get().clone()
                },
                Entry::Vacant(entry) => {
                    trace!(%key, "starting fetch");
                    let shared = self.start_fetch(key.clone(), fetch(cancel.clone()));
                    entry.insert(shared.clone());
                    shared
                },
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = shared => result,
            };
            match result {
                Err(FetchError::Cancelled) if !cancel.is_cancelled() => {
                    debug!(%key, "shared fetch was cancelled by its initiator, fetching again");
                },
                result => return result,
            }
        }
    }

    /// The returned future stores a successful result and unregisters
    /// itself from the in-flight table when it completes.
    fn start_fetch<Fut>(&self, key: K, fetch: Fut) -> SharedFetch<V>
    where
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        async move {
            let result = fetch.await.map(Arc::new);
            if let Ok(value) = &result {
                inner.entries.insert(key.clone(), CacheEntry {
                    value: Arc::clone(value),
                    fetched_at: Utc::now(),
                });
            }
            inner.in_flight.remove(&key);
            result
        }
        .boxed()
        .shared()
    }
}

/// Serializable copy of a cache's entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot<K, V> {
    pub entries: Vec<SnapshotEntry<K, V>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry<K, V> {
    pub key: K,
    pub value: V,
    pub fetched_at: DateTime<Utc>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn snapshot(&self) -> CacheSnapshot<K, V> {
        let entries = self
            .inner
            .entries
            .iter()
            .map(|entry| SnapshotEntry {
                key: entry.key().clone(),
                value: V::clone(&entry.value().value),
                fetched_at: entry.value().fetched_at,
            })
            .collect();
        CacheSnapshot { entries }
    }

    /// Load entries that are still fresh and not cached yet.
    ///
    /// Returns the number of restored entries.
    pub fn restore(&self, snapshot: CacheSnapshot<K, V>) -> usize {
        let now = Utc::now();
        let mut restored = 0;
        for entry in snapshot.entries {
            if !self.is_fresh(entry.fetched_at, now) {
                continue;
            }
            if let Entry::Vacant(vacant) = self.inner.entries.entry(entry.key) {
                vacant.insert(CacheEntry {
                    value: Arc::new(entry.value),
                    fetched_at: entry.fetched_at,
                });
                restored += 1;
            }
        }
        debug!(restored, "restored cache entries");
        restored
    }
}

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

/// Bounds for resolving many details at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of simultaneous requests.
    pub concurrency: usize,
    /// Pause between consecutive batches.
    pub delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            delay: Duration::from_millis(100),
        }
    }
}

/// Item details by id, fetched through the catalog client.
#[derive(Debug)]
pub struct ItemCache<C> {
    client: Arc<C>,
    details: Cache<ItemId, ItemDetail>,
    retry: RetryPolicy,
}

impl<C> ItemCache<C>
where
    C: ClientTrait + 'static,
{
    /// Fetches are not retried unless a policy is set with
    /// [ItemCache::with_retry].
    pub fn new(client: Arc<C>, ttl: Duration) -> Self {
        Self {
            client,
            details: Cache::new(ttl),
            retry: RetryPolicy::no_retry(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn details(&self) -> &Cache<ItemId, ItemDetail> {
        &self.details
    }

    pub fn peek(&self, id: ItemId) -> Option<Arc<ItemDetail>> {
        self.details.peek(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<Arc<ItemDetail>> {
        self.details.get(&id)
    }

    pub fn insert(&self, detail: ItemDetail) -> Arc<ItemDetail> {
        self.details.insert(detail.id, detail)
    }

    #[instrument(skip_all, fields(id = %id))]
    pub async fn resolve(
        &self,
        id: ItemId,
        cancel: &CancellationToken,
    ) -> Result<Arc<ItemDetail>, FetchError> {
        let client = Arc::clone(&self.client);
        let policy = self.retry.clone();
        self.details
            .resolve_with(id, cancel, move |token| {
                let client = Arc::clone(&client);
                let policy = policy.clone();
                async move {
                    retry(&policy, &token, || {
                        let client = Arc::clone(&client);
                        let token = token.clone();
                        async move { client.get_detail(&ItemKey::Id(id), &token).await }
                    })
                    .await
                }
            })
            .await
    }

    /// Resolve every id in `ids`, yielding results as they arrive.
    ///
    /// Ids are fetched in batches of at most `batch.concurrency`, with
    /// `batch.delay` between batches. A failure only affects its own id.
    /// The stream ends early once `cancel` fires.
    pub fn resolve_many<'a>(
        &'a self,
        ids: Vec<ItemId>,
        cancel: &'a CancellationToken,
        batch: BatchConfig,
    ) -> impl Stream<Item = (ItemId, Result<Arc<ItemDetail>, FetchError>)> + Send + 'a {
        async_stream::stream! {
            let mut batches = ids.chunks(batch.concurrency.max(1)).peekable();
            while let Some(ids) = batches.next() {
                debug!(size = ids.len(), "resolving batch of details");
                let mut pending: FuturesUnordered<_> = ids
                    .iter()
                    .map(|&id| async move { (id, self.resolve(id, cancel).await) })
                    .collect();
                while let Some(resolved) = pending.next().await {
                    yield resolved;
                }

                if batches.peek().is_none() || cancel.is_cancelled() {
                    break;
                }
                if !batch.delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(batch.delay) => {},
                    }
                }
            }
        }
    }

    /// Resolve `id` in the background.
    pub fn prefetch(self: &Arc<Self>, id: ItemId, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = cache.resolve(id, &cancel).await {
                debug!(%id, %err, "prefetch failed");
            }
        })
    }

    pub fn snapshot(&self) -> CacheSnapshot<ItemId, ItemDetail> {
        self.details.snapshot()
    }

    pub fn restore(&self, snapshot: CacheSnapshot<ItemId, ItemDetail>) -> usize {
        self.details.restore(snapshot)
    }
}

/// Species metadata by id or name.
#[derive(Debug)]
pub struct SpeciesCache<C> {
    client: Arc<C>,
    species: Cache<ItemKey, SpeciesMeta>,
}

impl<C> SpeciesCache<C>
where
    C: ClientTrait + 'static,
{
    pub fn new(client: Arc<C>, ttl: Duration) -> Self {
        Self {
            client,
            species: Cache::new(ttl),
        }
    }

    #[instrument(skip_all, fields(key = %key))]
    pub async fn resolve(
        &self,
        key: ItemKey,
        cancel: &CancellationToken,
    ) -> Result<Arc<SpeciesMeta>, FetchError> {
        let client = Arc::clone(&self.client);
        self.species
            .resolve_with(key.clone(), cancel, move |token| {
                let client = Arc::clone(&client);
                let key = key.clone();
                async move { client.get_species(&key, &token).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use dex_catalog::{MockClient, fixtures};
    use pretty_assertions::assert_eq;

    use super::*;

    fn mock(latency_ms: u64) -> Arc<MockClient> {
        let latency = Duration::from_millis(latency_ms);
        Arc::new(MockClient::new(fixtures::sample_data()).with_latency(latency))
    }

    // region: generic cache

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache: Cache<u32, String> = Cache::new(DEFAULT_TTL);
        let attempts = AtomicUsize::new(0);
        let fetch = |_token: CancellationToken| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(FetchError::Network {
                        message: "connection reset".to_string(),
                    })
                } else {
                    Ok("value".to_string())
                }
            }
        };
        let cancel = CancellationToken::new();

        assert!(cache.resolve_with(1, &cancel, fetch).await.is_err());
        assert!(cache.peek(&1).is_none());
        assert!(!cache.is_in_flight(&1));
        assert_eq!(cache.resolve_with(1, &cancel, fetch).await.unwrap().as_str(), "value");
        assert_eq!(cache.resolve_with(1, &cancel, fetch).await.unwrap().as_str(), "value");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_always_refetches_but_keeps_stale_value_visible() {
        let cache: Cache<u32, u32> = Cache::new(Duration::ZERO);
        let attempts = AtomicUsize::new(0);
        let fetch = |_token: CancellationToken| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) as u32;
            async move { Ok(attempt) }
        };
        let cancel = CancellationToken::new();

        assert_eq!(*cache.resolve_with(7, &cancel, fetch).await.unwrap(), 0);
        assert_eq!(cache.get(&7), None);
        assert_eq!(cache.peek(&7).as_deref(), Some(&0));
        assert_eq!(*cache.resolve_with(7, &cancel, fetch).await.unwrap(), 1);
    }

    #[test]
    fn restore_skips_stale_entries() {
        let cache: Cache<ItemId, String> = Cache::new(Duration::from_secs(600));
        let now = Utc::now();
        let snapshot = CacheSnapshot {
            entries: vec![
                SnapshotEntry {
                    key: ItemId(1),
                    value: "fresh".to_string(),
                    fetched_at: now - chrono::Duration::seconds(60),
                },
                SnapshotEntry {
                    key: ItemId(2),
                    value: "stale".to_string(),
                    fetched_at: now - chrono::Duration::seconds(3600),
                },
            ],
        };
        assert_eq!(cache.restore(snapshot), 1);
        assert_eq!(cache.get(&ItemId(1)).as_deref().map(String::as_str), Some("fresh"));
        assert_eq!(cache.peek(&ItemId(2)), None);

        let json = serde_json::to_value(cache.snapshot()).unwrap();
        assert_eq!(json["entries"][0]["key"], 1);
        assert!(json["entries"][0]["fetchedAt"].is_string());
    }

    // endregion

    // region: item details

    #[tokio::test(start_paused = true)]
    async fn concurrent_resolves_share_one_request() {
        let client = mock(100);
        let cache = ItemCache::new(Arc::clone(&client), DEFAULT_TTL);
        let cancel = CancellationToken::new();

        let (first, second) = tokio::join!(
            cache.resolve(ItemId(25), &cancel),
            cache.resolve(ItemId(25), &cancel)
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(client.calls().detail, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name, "pikachu");

        cache.resolve(ItemId(25), &cancel).await.unwrap();
        assert_eq!(client.calls().detail, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_share_failures() {
        let client = mock(100);
        client.fail_detail(ItemId(4), FetchError::Status {
            status: 500,
            message: "Internal Server Error".to_string(),
        });
        let cache = ItemCache::new(Arc::clone(&client), DEFAULT_TTL);
        let cancel = CancellationToken::new();

        let (first, second) = tokio::join!(
            cache.resolve(ItemId(4), &cancel),
            cache.resolve(ItemId(4), &cancel)
        );
        assert_eq!(first, second);
        assert!(first.is_err());
        assert_eq!(client.calls().detail, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_survives_cancellation_of_the_initiator() {
        let client = mock(100);
        let cache = ItemCache::new(Arc::clone(&client), DEFAULT_TTL);
        let initiator = CancellationToken::new();
        let waiter = CancellationToken::new();

        let cancel_initiator = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            initiator.cancel();
        };
        let (first, second, ()) = tokio::join!(
            cache.resolve(ItemId(1), &initiator),
            cache.resolve(ItemId(1), &waiter),
            cancel_initiator
        );

        assert_eq!(first, Err(FetchError::Cancelled));
        assert_eq!(second.unwrap().name, "bulbasaur");
        assert_eq!(client.calls().detail, 2);
        assert!(!cache.details().is_in_flight(&ItemId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_many_bounds_concurrency_and_isolates_failures() {
        let client = mock(10);
        client.fail_detail(ItemId(5), FetchError::NotFound {
            what: "item '5'".to_string(),
        });
        let cache = ItemCache::new(Arc::clone(&client), DEFAULT_TTL);
        let cancel = CancellationToken::new();
        let ids: Vec<ItemId> = [1, 2, 3, 4, 5, 6, 7].into_iter().map(ItemId).collect();
        let batch = BatchConfig {
            concurrency: 3,
            delay: Duration::from_millis(100),
        };

        let started = tokio::time::Instant::now();
        let results: Vec<_> = cache.resolve_many(ids, &cancel, batch).collect().await;

        assert_eq!(results.len(), 7);
        let failed: Vec<_> = results
            .iter()
            .filter(|(_, result)| result.is_err())
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(failed, [ItemId(5)]);
        assert_eq!(client.calls().detail, 7);
        // three batches of 10ms each, two pauses of 100ms in between
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(230), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_many_stops_when_cancelled() {
        let client = mock(10);
        let cache = ItemCache::new(Arc::clone(&client), DEFAULT_TTL);
        let cancel = CancellationToken::new();
        let ids: Vec<ItemId> = [1, 2, 3, 4].into_iter().map(ItemId).collect();
        let batch = BatchConfig {
            concurrency: 2,
            delay: Duration::from_millis(100),
        };

        let stream = cache.resolve_many(ids, &cancel, batch);
        futures::pin_mut!(stream);
        let mut resolved = vec![];
        while let Some((id, _)) = stream.next().await {
            resolved.push(id);
            cancel.cancel();
        }
        // the first batch is drained, the second never starts
        assert_eq!(resolved.len(), 2);
        assert!(!resolved.contains(&ItemId(3)));
        assert_eq!(client.calls().detail, 2);
    }

    #[tokio::test]
    async fn prefetch_fills_the_cache() {
        let client = mock(0);
        let cache = Arc::new(ItemCache::new(Arc::clone(&client), DEFAULT_TTL));
        cache
            .prefetch(ItemId(7), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(cache.peek(ItemId(7)).unwrap().name, "squirtle");
    }

    #[tokio::test]
    async fn species_by_name_and_id_are_cached_separately() {
        let client = mock(0);
        let cache = SpeciesCache::new(Arc::clone(&client), DEFAULT_TTL);
        let cancel = CancellationToken::new();

        let by_name = cache
            .resolve(ItemKey::Name("pikachu".to_string()), &cancel)
            .await
            .unwrap();
        let by_id = cache.resolve(ItemKey::Id(ItemId(25)), &cancel).await.unwrap();
        assert_eq!(by_name, by_id);
        cache.resolve(ItemKey::Id(ItemId(25)), &cancel).await.unwrap();
        assert_eq!(client.calls().species, 2);
    }

    // endregion
}
