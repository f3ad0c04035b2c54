//! Decoded chunk cache shared by all level arrays.
//!
//! Chunks are cached after decompression, keyed by the source file, the IFD
//! offset of the directory they belong to and the chunk index. The cache is
//! bounded by the total size of the decoded bytes and evicts least recently
//! used chunks first.
//!
//! Concurrent requests for the same chunk share one load: the first caller
//! decodes while the others wait for it and then read the result from the
//! cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::trace;

use crate::error::ReaderError;

/// Default capacity: 4 GB of decoded samples
pub const DEFAULT_CHUNK_CACHE_CAPACITY: usize = 4_000_000_000;

// =============================================================================
// Cache Key
// =============================================================================

/// Identifies one decoded chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    /// Source identifier (file path)
    pub source: Arc<str>,

    /// Offset of the IFD the chunk belongs to
    pub directory: u64,

    /// Chunk index within the directory
    pub chunk: u32,
}

impl ChunkKey {
    pub fn new(source: impl Into<Arc<str>>, directory: u64, chunk: u32) -> Self {
        Self {
            source: source.into(),
            directory,
            chunk,
        }
    }
}

// =============================================================================
// ChunkCache
// =============================================================================

struct Entries {
    lru: LruCache<ChunkKey, Bytes>,
    size: usize,
}

/// Size-bounded LRU cache of decoded chunks.
///
/// Shared between readers through `Arc<ChunkCache>`.
pub struct ChunkCache {
    entries: RwLock<Entries>,
    in_flight: Mutex<HashMap<ChunkKey, Arc<Notify>>>,
    capacity: usize,
}

impl ChunkCache {
    /// Cache with the default 4 GB capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHUNK_CACHE_CAPACITY)
    }

    /// Cache holding at most `capacity` bytes of decoded chunks.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries {
                lru: LruCache::unbounded(),
                size: 0,
            }),
            in_flight: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get a chunk, marking it as recently used.
    pub async fn get(&self, key: &ChunkKey) -> Option<Bytes> {
        let mut entries = self.entries.write().await;
        entries.lru.get(key).cloned()
    }

    /// Check for a chunk without updating LRU order.
    pub async fn contains(&self, key: &ChunkKey) -> bool {
        self.entries.read().await.lru.contains(key)
    }

    /// Store a chunk, evicting least recently used chunks beyond capacity.
    ///
    /// A chunk larger than the whole capacity is not stored.
    pub async fn put(&self, key: ChunkKey, data: Bytes) {
        if data.len() > self.capacity {
            trace!(chunk = key.chunk, size = data.len(), "chunk exceeds cache capacity");
            return;
        }

        let mut entries = self.entries.write().await;
        let added = data.len();
        if let Some(old) = entries.lru.put(key, data) {
            entries.size = entries.size.saturating_sub(old.len());
        }
        entries.size += added;

        while entries.size > self.capacity {
            match entries.lru.pop_lru() {
                Some((_, evicted)) => {
                    entries.size = entries.size.saturating_sub(evicted.len());
                }
                None => break,
            }
        }
    }

    /// Number of cached chunks.
    pub async fn len(&self) -> usize {
        self.entries.read().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total size of cached chunks in bytes.
    pub async fn size(&self) -> usize {
        self.entries.read().await.size
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.lru.clear();
        entries.size = 0;
    }

    /// Return the cached chunk or run `load` to produce it.
    ///
    /// Only one `load` runs per key at a time. Callers arriving while it runs
    /// wait and then take the cached result. If the load fails, the error
    /// goes to its caller and a waiting caller loads again.
    pub async fn get_or_load<F, Fut>(&self, key: &ChunkKey, load: F) -> Result<Bytes, ReaderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, ReaderError>>,
    {
        let mut load = Some(load);
        loop {
            if let Some(data) = self.get(key).await {
                return Ok(data);
            }

            let notify = {
                let mut in_flight = self.in_flight.lock().await;
                if let Some(notify) = in_flight.get(key) {
                    // Register before releasing the lock so the leader's
                    // notification cannot be missed
                    let notify = notify.clone();
                    let notified = notify.notified();
                    drop(in_flight);
                    notified.await;
                    continue;
                }

                // Between our cache miss and taking the lock, a leader may
                // have finished
                if self.contains(key).await {
                    continue;
                }

                let notify = Arc::new(Notify::new());
                in_flight.insert(key.clone(), notify.clone());
                notify
            };

            let result = match load.take() {
                Some(load) => load().await,
                None => Err(ReaderError::InvalidRequest(
                    "chunk loader already consumed".to_string(),
                )),
            };

            if let Ok(data) = &result {
                self.put(key.clone(), data.clone()).await;
            }
            self.in_flight.lock().await.remove(key);
            notify.notify_waiters();

            return result;
        }
    }
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
