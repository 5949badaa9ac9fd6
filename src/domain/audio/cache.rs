use super::error::SynthesisError;
use super::model::{AudioSegment, CacheKey};
use crate::infrastructure::repositories::SegmentStore;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Entries held in the in-memory index.
    pub memory_capacity: u64,
    /// Idle lifetime of in-memory entries; disk copies outlive this.
    pub memory_ttl: Duration,
    /// Durable entries older than this are pruned.
    pub disk_max_age: Duration,
    /// Upper bound on durable entries; oldest evicted first.
    pub disk_max_entries: usize,
    /// How often the background prune sweep runs.
    pub prune_interval: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            memory_capacity: 512,
            memory_ttl: Duration::from_secs(30 * 60),
            disk_max_age: Duration::from_secs(7 * 24 * 3600),
            disk_max_entries: 10_000,
            prune_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Content-addressed store of synthesized audio.
///
/// The moka layer doubles as the single-flight mechanism: concurrent
/// requests for one key converge on a single resolution future, and every
/// caller receives that future's segment or its failure. Entries being
/// resolved are never evicted, so eviction cannot affect an in-flight key.
pub struct SegmentCache {
    memory: Cache<CacheKey, Arc<AudioSegment>>,
    store: Arc<dyn SegmentStore>,
    options: CacheOptions,
}

impl SegmentCache {
    pub fn new(store: Arc<dyn SegmentStore>, options: CacheOptions) -> Self {
        let memory = Cache::builder()
            .max_capacity(options.memory_capacity)
            .time_to_idle(options.memory_ttl)
            .build();
        Self {
            memory,
            store,
            options,
        }
    }

    /// Return the cached segment for `key`, or resolve it by running
    /// `synthesize` exactly once across all concurrent callers.
    ///
    /// Resolution order: durable store (checksum-verified) first, then the
    /// provided synthesis future. A corrupt durable entry is evicted and
    /// regenerated; failed regeneration is the caller's error to classify.
    pub async fn get_or_synthesize<F>(
        &self,
        key: &CacheKey,
        synthesize: F,
    ) -> Result<Arc<AudioSegment>, SynthesisError>
    where
        F: Future<Output = Result<AudioSegment, SynthesisError>>,
    {
        self.memory
            .try_get_with_by_ref(key, self.resolve(key, synthesize))
            .await
            .map_err(|shared: Arc<SynthesisError>| (*shared).clone())
    }

    async fn resolve<F>(
        &self,
        key: &CacheKey,
        synthesize: F,
    ) -> Result<Arc<AudioSegment>, SynthesisError>
    where
        F: Future<Output = Result<AudioSegment, SynthesisError>>,
    {
        match self.store.load(key).await {
            Ok(Some(segment)) if segment.verify_checksum() => {
                tracing::debug!(key = %key, "Segment cache hit from durable store");
                return Ok(Arc::new(segment));
            }
            Ok(Some(_)) => {
                tracing::warn!(
                    key = %key,
                    "Corrupt segment detected on read; evicting and regenerating"
                );
                if let Err(e) = self.store.remove(key).await {
                    tracing::warn!(key = %key, error = %e, "Failed to evict corrupt segment");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Segment store read failed; synthesizing");
            }
        }

        let segment = synthesize.await?;

        // Identical bytes are a no-op in the store; differing bytes
        // overwrite, which is what repairs a corrupted entry.
        if let Err(e) = self.store.save(key, &segment).await {
            tracing::warn!(
                key = %key,
                error = %e,
                "Failed to persist segment; serving from memory only"
            );
        }

        Ok(Arc::new(segment))
    }

    /// Periodic age- and count-bounded prune of the durable store.
    ///
    /// Returns a shutdown sender for the sweep task. In-flight keys are
    /// unaffected: unfinished syntheses have nothing on disk yet, and the
    /// memory layer pins entries under resolution.
    pub fn start_prune_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let cache = Arc::clone(self);
        let interval = cache.options.prune_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        match cache
                            .store
                            .prune(cache.options.disk_max_age, cache.options.disk_max_entries)
                            .await
                        {
                            Ok(0) => {}
                            Ok(evicted) => {
                                tracing::info!(evicted = evicted, "Segment store pruned");
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Segment store prune failed");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Segment cache prune task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::StoreError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory stand-in for the durable store.
    #[derive(Default)]
    struct MemStore {
        entries: Mutex<HashMap<CacheKey, AudioSegment>>,
    }

    impl MemStore {
        fn insert(&self, key: &CacheKey, segment: AudioSegment) {
            self.entries.lock().insert(key.clone(), segment);
        }

        fn corrupt(&self, key: &CacheKey) {
            let mut entries = self.entries.lock();
            if let Some(segment) = entries.get_mut(key) {
                segment.bytes = vec![0xde, 0xad];
            }
        }

        fn get(&self, key: &CacheKey) -> Option<AudioSegment> {
            self.entries.lock().get(key).cloned()
        }
    }

    #[async_trait]
    impl SegmentStore for MemStore {
        async fn load(&self, key: &CacheKey) -> Result<Option<AudioSegment>, StoreError> {
            Ok(self.entries.lock().get(key).cloned())
        }

        async fn save(&self, key: &CacheKey, segment: &AudioSegment) -> Result<(), StoreError> {
            self.entries.lock().insert(key.clone(), segment.clone());
            Ok(())
        }

        async fn remove(&self, key: &CacheKey) -> Result<(), StoreError> {
            self.entries.lock().remove(key);
            Ok(())
        }

        async fn prune(&self, _max_age: Duration, _max_entries: usize) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    fn test_cache() -> (Arc<SegmentCache>, Arc<MemStore>) {
        let store = Arc::new(MemStore::default());
        let cache = Arc::new(SegmentCache::new(store.clone(), CacheOptions::default()));
        (cache, store)
    }

    fn segment(payload: &[u8]) -> AudioSegment {
        AudioSegment::new(payload.to_vec(), 1000, 22050)
    }

    #[tokio::test]
    async fn test_concurrent_requests_collapse_into_one_synthesis() {
        let (cache, _store) = test_cache();
        let key = CacheKey::for_request("hello", "Joanna", "neutral");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let key = key.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_synthesize(&key, async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Keep the synthesis open long enough for all
                        // callers to pile onto the same key.
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(segment(b"audio"))
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one synthesis call");
        for result in &results {
            assert_eq!(result.bytes, results[0].bytes, "all callers see identical bytes");
        }
    }

    #[tokio::test]
    async fn test_failure_is_shared_by_concurrent_callers_but_not_cached() {
        let (cache, _store) = test_cache();
        let key = CacheKey::for_request("boom", "Joanna", "neutral");
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = {
            let calls = calls.clone();
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_synthesize(&key, async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err(SynthesisError::Unavailable("down".into()))
                    })
                    .await
            })
        };
        let waiter = {
            let calls = calls.clone();
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                cache
                    .get_or_synthesize(&key, async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(SynthesisError::Unavailable("down".into()))
                    })
                    .await
            })
        };

        assert!(failing.await.unwrap().is_err());
        assert!(waiter.await.unwrap().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "waiter shares the failure");

        // A later request retries; failures are not cached.
        let recovered = cache
            .get_or_synthesize(&key, async { Ok(segment(b"recovered")) })
            .await
            .unwrap();
        assert_eq!(recovered.bytes, b"recovered");
    }

    #[tokio::test]
    async fn test_durable_hit_skips_synthesis() {
        let (cache, store) = test_cache();
        let key = CacheKey::for_request("warm", "Joanna", "neutral");
        store.insert(&key, segment(b"persisted"));

        let result = cache
            .get_or_synthesize(&key, async {
                panic!("synthesis must not run on a warm key");
            })
            .await
            .unwrap();

        assert_eq!(result.bytes, b"persisted");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_evicted_and_regenerated() {
        let (cache, store) = test_cache();
        let key = CacheKey::for_request("corrupt", "Joanna", "neutral");
        store.insert(&key, segment(b"original"));
        store.corrupt(&key);

        let result = cache
            .get_or_synthesize(&key, async { Ok(segment(b"regenerated")) })
            .await
            .unwrap();

        assert_eq!(result.bytes, b"regenerated");

        // The store is repaired with the regenerated segment.
        let repaired = store.get(&key).unwrap();
        assert_eq!(repaired.bytes, b"regenerated");
        assert!(repaired.verify_checksum());
    }

    #[tokio::test]
    async fn test_synthesized_segment_is_persisted() {
        let (cache, store) = test_cache();
        let key = CacheKey::for_request("fresh", "Joanna", "neutral");

        cache
            .get_or_synthesize(&key, async { Ok(segment(b"fresh-audio")) })
            .await
            .unwrap();

        let persisted = store.get(&key).unwrap();
        assert_eq!(persisted.bytes, b"fresh-audio");
    }
}
