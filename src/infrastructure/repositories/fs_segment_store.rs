use super::segment_store::{SegmentStore, StoreError};
use crate::domain::audio::{AudioSegment, CacheKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Sidecar metadata persisted next to the audio blob.
#[derive(Debug, Serialize, Deserialize)]
struct SegmentMeta {
    duration_ms: u64,
    sample_rate: u32,
    checksum: String,
}

/// Filesystem-backed segment store: one `<digest>.mp3` blob plus a
/// `<digest>.json` sidecar per key. The digest in the file name is the cache
/// key, so the layout is a plain key → blob mapping.
pub struct FsSegmentStore {
    dir: PathBuf,
}

impl FsSegmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.mp3"))
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    async fn read_meta(&self, path: &Path) -> Result<Option<SegmentMeta>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(raw) => {
                let meta = serde_json::from_slice(&raw)
                    .map_err(|e| StoreError::Metadata(e.to_string()))?;
                Ok(Some(meta))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SegmentStore for FsSegmentStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<AudioSegment>, StoreError> {
        let Some(meta) = self.read_meta(&self.meta_path(key)).await? else {
            return Ok(None);
        };

        let bytes = match tokio::fs::read(self.blob_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(AudioSegment::from_parts(
            bytes,
            meta.duration_ms,
            meta.sample_rate,
            meta.checksum,
        )))
    }

    async fn save(&self, key: &CacheKey, segment: &AudioSegment) -> Result<(), StoreError> {
        // Identical bytes already on disk: nothing to do.
        if let Some(existing) = self.read_meta(&self.meta_path(key)).await.ok().flatten() {
            if existing.checksum == segment.checksum {
                tracing::debug!(key = %key, "Segment already persisted; save is a no-op");
                return Ok(());
            }
            tracing::info!(key = %key, "Overwriting persisted segment with new bytes");
        }

        let meta = SegmentMeta {
            duration_ms: segment.duration_ms,
            sample_rate: segment.sample_rate,
            checksum: segment.checksum.clone(),
        };
        let meta_json =
            serde_json::to_vec(&meta).map_err(|e| StoreError::Metadata(e.to_string()))?;

        // Blob first, sidecar last: a key only becomes visible once both
        // halves are on disk.
        tokio::fs::write(self.blob_path(key), &segment.bytes).await?;
        tokio::fs::write(self.meta_path(key), meta_json).await?;

        tracing::debug!(
            key = %key,
            audio_size = segment.bytes.len(),
            "Segment persisted"
        );
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), StoreError> {
        for path in [self.meta_path(key), self.blob_path(key)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn prune(&self, max_age: Duration, max_entries: usize) -> Result<usize, StoreError> {
        let mut entries: Vec<(PathBuf, SystemTime)> = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            entries.push((path, modified));
        }

        let now = SystemTime::now();
        let mut evict: Vec<PathBuf> = Vec::new();

        // Age bound first.
        entries.retain(|(path, modified)| {
            let too_old = now
                .duration_since(*modified)
                .map(|age| age > max_age)
                .unwrap_or(false);
            if too_old {
                evict.push(path.clone());
            }
            !too_old
        });

        // Then the count bound, oldest first.
        if entries.len() > max_entries {
            entries.sort_by_key(|(_, modified)| *modified);
            let excess = entries.len() - max_entries;
            evict.extend(entries.drain(..excess).map(|(path, _)| path));
        }

        let evicted = evict.len();
        for meta_path in evict {
            let blob_path = meta_path.with_extension("mp3");
            for path in [meta_path, blob_path] {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (FsSegmentStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSegmentStore::new(dir.path()).unwrap();
        (store, dir)
    }

    fn key(text: &str) -> CacheKey {
        CacheKey::for_request(text, "Joanna", "neutral")
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let (store, _dir) = store();
        let key = key("round trip");
        let segment = AudioSegment::new(b"mp3-bytes".to_vec(), 1234, 22050);

        store.save(&key, &segment).await.unwrap();
        let loaded = store.load(&key).await.unwrap().unwrap();

        assert_eq!(loaded, segment);
        assert!(loaded.verify_checksum());
    }

    #[tokio::test]
    async fn test_missing_key_loads_none() {
        let (store, _dir) = store();
        assert!(store.load(&key("absent")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_is_idempotent_and_overwrites_differing_bytes() {
        let (store, _dir) = store();
        let key = key("idempotent");
        let original = AudioSegment::new(b"first".to_vec(), 100, 22050);

        store.save(&key, &original).await.unwrap();
        store.save(&key, &original).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap().unwrap().bytes, b"first");

        // Differing bytes overwrite (the corruption-repair path).
        let replacement = AudioSegment::new(b"second".to_vec(), 100, 22050);
        store.save(&key, &replacement).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap().unwrap().bytes, b"second");
    }

    #[tokio::test]
    async fn test_tampered_blob_fails_checksum_after_load() {
        let (store, dir) = store();
        let key = key("tampered");
        let segment = AudioSegment::new(b"legit audio".to_vec(), 500, 22050);
        store.save(&key, &segment).await.unwrap();

        // Corrupt the blob on disk behind the store's back.
        let blob = dir.path().join(format!("{key}.mp3"));
        std::fs::write(blob, b"garbage").unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert!(!loaded.verify_checksum(), "corruption must be detectable");
    }

    #[tokio::test]
    async fn test_remove_is_tolerant_of_absent_keys() {
        let (store, _dir) = store();
        let key = key("removable");
        store
            .save(&key, &AudioSegment::new(b"x".to_vec(), 1, 22050))
            .await
            .unwrap();

        store.remove(&key).await.unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
        // Second remove is a no-op, not an error.
        store.remove(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_by_count_keeps_newest() {
        let (store, _dir) = store();
        for i in 0..5 {
            let key = key(&format!("entry {i}"));
            store
                .save(&key, &AudioSegment::new(vec![i as u8], 1, 22050))
                .await
                .unwrap();
            // Distinct mtimes so ordering is stable.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let evicted = store.prune(Duration::from_secs(3600), 2).await.unwrap();
        assert_eq!(evicted, 3);

        assert!(store.load(&key("entry 0")).await.unwrap().is_none());
        assert!(store.load(&key("entry 4")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_prune_by_age() {
        let (store, _dir) = store();
        store
            .save(&key("old"), &AudioSegment::new(b"x".to_vec(), 1, 22050))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let evicted = store.prune(Duration::from_millis(1), 100).await.unwrap();

        assert_eq!(evicted, 1);
        assert!(store.load(&key("old")).await.unwrap().is_none());
    }
}
