use crate::domain::audio::{AudioSegment, CacheKey};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt segment metadata: {0}")]
    Metadata(String),
}

/// Durable key → blob mapping backing the segment cache.
///
/// Storage-technology agnostic: the cache only relies on load/save/remove
/// semantics plus an age- and count-bounded prune.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Load a segment if present. The returned segment's checksum is the
    /// persisted one; callers verify it against the bytes.
    async fn load(&self, key: &CacheKey) -> Result<Option<AudioSegment>, StoreError>;

    /// Persist a segment. Saving identical bytes for an existing key is a
    /// no-op; differing bytes overwrite (corruption-repair path).
    async fn save(&self, key: &CacheKey, segment: &AudioSegment) -> Result<(), StoreError>;

    /// Drop a single entry; absent keys are not an error.
    async fn remove(&self, key: &CacheKey) -> Result<(), StoreError>;

    /// Evict entries older than `max_age` and, beyond that, the oldest
    /// entries over `max_entries`. Returns the number of evicted entries.
    async fn prune(&self, max_age: Duration, max_entries: usize) -> Result<usize, StoreError>;
}
