// src/cache.rs

//! Time-to-live cache and the cached-resource wrapper built on top of it.
//!
//! Entries expire lazily: nothing scans for stale entries, an expired entry is
//! treated as absent and dropped the next time it is read. Every cache is an
//! explicit value owned by whoever needs it (normally `AppState`), so tests can
//! build isolated instances.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use serde::Serialize;
use tokio::sync::watch;

pub const DEFAULT_TTL_MINUTES: u64 = 5;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

struct PerEntryTtl;

impl<V> Expiry<String, CacheEntry<V>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// String-keyed cache with a TTL per entry. Unbounded: only expiry removes entries.
#[derive(Clone)]
pub struct TtlCache<V: Clone + Send + Sync + 'static> {
    entries: Cache<String, CacheEntry<V>>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().expire_after(PerEntryTtl).build(),
        }
    }

    /// Returns the value when present and fresh. An expired entry is removed.
    pub async fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key).await?;
        if entry.is_expired_at(Instant::now()) {
            self.entries.invalidate(key).await;
            return None;
        }
        Some(entry.value)
    }

    pub async fn set(&self, key: impl Into<String>, value: V) {
        self.set_minutes(key, value, DEFAULT_TTL_MINUTES).await;
    }

    pub async fn set_minutes(&self, key: impl Into<String>, value: V, ttl_minutes: u64) {
        self.set_with_ttl(key, value, Duration::from_secs(ttl_minutes * 60))
            .await;
    }

    pub async fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries
            .insert(key.into(), CacheEntry::new(value, ttl))
            .await;
    }

    pub async fn delete(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    pub fn clear_all(&self) {
        self.entries.invalidate_all();
    }

    /// Approximate: moka applies pending writes and evictions lazily.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl<V: Clone + Send + Sync + 'static> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

/// Snapshot published to subscribers of a [`CachedResource`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FetchState<V> {
    pub data: Option<V>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<V> Default for FetchState<V> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

/// A cache-backed async resource.
///
/// `load` serves from the cache when it can and calls the producer otherwise;
/// `refetch` always calls the producer. Each call takes a new generation
/// number and only the latest generation may publish, so a slow response for
/// an older key can never overwrite a newer one.
#[derive(Clone)]
pub struct CachedResource<V: Clone + Send + Sync + 'static> {
    cache: TtlCache<V>,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<FetchState<V>>>,
}

impl<V: Clone + Send + Sync + 'static> CachedResource<V> {
    pub fn new(cache: TtlCache<V>) -> Self {
        let (tx, _rx) = watch::channel(FetchState::default());
        Self {
            cache,
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<V>> {
        self.state.subscribe()
    }

    pub fn current(&self) -> FetchState<V> {
        self.state.borrow().clone()
    }

    pub fn cache(&self) -> &TtlCache<V> {
        &self.cache
    }

    pub async fn load<F, Fut, E>(&self, key: &str, ttl: Duration, producer: F) -> FetchState<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: fmt::Display,
    {
        let generation = self.next_generation();

        if let Some(value) = self.cache.get(key).await {
            tracing::debug!("Cache HIT for resource '{}'", key);
            let state = FetchState {
                data: Some(value),
                loading: false,
                error: None,
            };
            self.publish(generation, &state);
            return state;
        }

        tracing::debug!("Cache MISS for resource '{}'", key);
        self.fetch(generation, key, ttl, producer).await
    }

    pub async fn refetch<F, Fut, E>(&self, key: &str, ttl: Duration, producer: F) -> FetchState<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: fmt::Display,
    {
        let generation = self.next_generation();
        self.cache.delete(key).await;
        self.fetch(generation, key, ttl, producer).await
    }

    async fn fetch<F, Fut, E>(
        &self,
        generation: u64,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> FetchState<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: fmt::Display,
    {
        self.publish_with(generation, |state| {
            state.loading = true;
            state.error = None;
        });

        let state = match producer().await {
            Ok(value) => {
                self.cache.set_with_ttl(key, value.clone(), ttl).await;
                FetchState {
                    data: Some(value),
                    loading: false,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("Fetching resource '{}' failed: {}", key, e);
                FetchState {
                    data: None,
                    loading: false,
                    error: Some(e.to_string()),
                }
            }
        };

        self.publish(generation, &state);
        state
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn publish(&self, generation: u64, state: &FetchState<V>) {
        self.publish_with(generation, |current| *current = state.clone());
    }

    fn publish_with(&self, generation: u64, update: impl FnOnce(&mut FetchState<V>)) {
        // checked under the channel lock so two generations cannot interleave
        self.state.send_if_modified(|current| {
            if !self.is_current(generation) {
                tracing::debug!("Discarding stale result of generation {}", generation);
                return false;
            }
            update(current);
            true
        });
    }
}

impl<V: Clone + Send + Sync + 'static> fmt::Debug for CachedResource<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedResource")
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn immediate_get_returns_the_stored_value() {
        let cache: TtlCache<Vec<String>> = TtlCache::new();
        let value = vec!["Caturra".to_string(), "Geisha".to_string()];
        cache.set("varieties", value.clone()).await;
        assert_eq!(cache.get("varieties").await, Some(value));
    }

    #[tokio::test]
    async fn never_set_key_is_absent() {
        let cache: TtlCache<u32> = TtlCache::new();
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn expired_entry_is_absent_and_evicted() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache
            .set_with_ttl("k", 42, Duration::from_millis(1))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.get("k").await, None);
    }

    #[test]
    fn entry_expiry_is_strictly_after_ttl() {
        let entry = CacheEntry::new(1, Duration::from_millis(10));
        assert!(!entry.is_expired_at(entry.created_at + Duration::from_millis(10)));
        assert!(entry.is_expired_at(entry.created_at + Duration::from_millis(11)));
    }

    #[tokio::test]
    async fn delete_and_clear_all_invalidate() {
        let cache: TtlCache<&'static str> = TtlCache::new();
        cache.set("a", "1").await;
        cache.set_minutes("b", "2", 10).await;

        cache.delete("a").await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some("2"));

        cache.clear_all();
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn separate_instances_do_not_share_entries() {
        let first: TtlCache<u8> = TtlCache::new();
        let second: TtlCache<u8> = TtlCache::new();
        first.set("k", 1).await;
        assert_eq!(second.get("k").await, None);
    }

    #[tokio::test]
    async fn load_hits_cache_without_calling_producer() {
        let resource = CachedResource::new(TtlCache::new());
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        for _ in 0..3 {
            let state = resource
                .load("provinces", ttl, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(vec!["Huila".to_string()])
                })
                .await;
            assert_eq!(state.data, Some(vec!["Huila".to_string()]));
            assert!(!state.loading);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(resource.current().data, Some(vec!["Huila".to_string()]));
    }

    #[tokio::test]
    async fn refetch_bypasses_cache() {
        let resource = CachedResource::new(TtlCache::new());
        let ttl = Duration::from_secs(60);
        resource
            .load("k", ttl, || async { Ok::<_, String>(1) })
            .await;
        let state = resource
            .refetch("k", ttl, || async { Ok::<_, String>(2) })
            .await;
        assert_eq!(state.data, Some(2));
        assert_eq!(resource.cache().get("k").await, Some(2));
    }

    #[tokio::test]
    async fn producer_failure_becomes_error_state() {
        let resource: CachedResource<u32> = CachedResource::new(TtlCache::new());
        let state = resource
            .load("k", Duration::from_secs(60), || async {
                Err::<u32, _>("connection refused")
            })
            .await;
        assert_eq!(state.data, None);
        assert_eq!(state.error.as_deref(), Some("connection refused"));
        assert_eq!(resource.current().error.as_deref(), Some("connection refused"));
        assert_eq!(resource.cache().get("k").await, None);
    }

    #[tokio::test]
    async fn stale_result_does_not_overwrite_newer_state() {
        let resource: CachedResource<&'static str> = CachedResource::new(TtlCache::new());
        let ttl = Duration::from_secs(60);
        let (release_slow, slow_gate) = oneshot::channel::<()>();

        let slow_resource = resource.clone();
        let slow = tokio::spawn(async move {
            slow_resource
                .load("old-key", ttl, || async move {
                    let _ = slow_gate.await;
                    Ok::<_, String>("old")
                })
                .await
        });

        // wait until the slow fetch has published its loading state
        let mut rx = resource.subscribe();
        rx.wait_for(|s| s.loading).await.unwrap();

        let fresh = resource
            .load("new-key", ttl, || async { Ok::<_, String>("new") })
            .await;
        assert_eq!(fresh.data, Some("new"));

        release_slow.send(()).unwrap();
        let stale = slow.await.unwrap();
        assert_eq!(stale.data, Some("old"));

        assert_eq!(resource.current().data, Some("new"));
    }
}
