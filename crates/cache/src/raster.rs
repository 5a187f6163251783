//! Page raster cache with LRU eviction
//!
//! Keeps rendered page pixels in memory so that navigating back to a page, or
//! repainting after an element edit, does not require another render. Entries are
//! keyed by page, scale and rotation; the least recently used rasters are evicted
//! when the memory limit is reached, and pages that leave the render window can be
//! dropped explicitly.

use std::collections::{HashMap, VecDeque};

/// Identifies one rendered raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterKey {
    /// 1-based page number
    pub page: u32,

    /// Scale in thousandths (1000 = 100%)
    pub scale_milli: u32,

    /// View rotation in degrees (0, 90, 180, 270)
    pub rotation: u16,
}

impl RasterKey {
    /// Create a key from a floating point scale factor
    pub fn new(page: u32, scale: f32, rotation: u16) -> Self {
        Self {
            page,
            scale_milli: (scale * 1000.0).round().max(0.0) as u32,
            rotation,
        }
    }
}

/// Cached raster data (RGBA, row-major)
#[derive(Debug, Clone)]
pub struct CachedRaster {
    pub key: RasterKey,
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CachedRaster {
    pub fn new(key: RasterKey, pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            key,
            pixels,
            width,
            height,
        }
    }

    /// Memory size of this raster in bytes
    pub fn memory_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of rasters currently in cache
    pub raster_count: usize,

    /// Total memory used by cached rasters (bytes)
    pub memory_used: usize,

    /// Maximum memory allowed (bytes)
    pub memory_limit: usize,

    pub hits: u64,
    pub misses: u64,

    /// Rasters evicted by the LRU policy or the render window
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0)
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_limit as f64
        }
    }
}

/// In-memory raster cache with LRU eviction
///
/// The editor runs on a single event loop, so the cache is a plain owned value
/// mutated through `&mut self`.
///
/// # Example
///
/// ```
/// use folio_cache::{RasterCache, RasterKey};
///
/// let mut cache = RasterCache::new(64 * 1024 * 1024);
/// let key = RasterKey::new(1, 1.5, 90);
///
/// cache.put(key, vec![0u8; 4 * 4 * 4], 4, 4);
/// assert!(cache.get(key).is_some());
/// ```
#[derive(Debug)]
pub struct RasterCache {
    rasters: HashMap<RasterKey, CachedRaster>,

    /// Most recently used at back, least recently used at front
    lru_queue: VecDeque<RasterKey>,

    memory_used: usize,
    memory_limit: usize,
    stats: CacheStats,
}

impl RasterCache {
    /// Create a cache with the given memory limit in bytes
    pub fn new(memory_limit: usize) -> Self {
        Self {
            rasters: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            stats: CacheStats {
                memory_limit,
                ..Default::default()
            },
        }
    }

    /// Create a cache with a memory limit in megabytes
    pub fn with_mb_limit(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    fn touch(&mut self, key: RasterKey) {
        self.lru_queue.retain(|k| *k != key);
        self.lru_queue.push_back(key);
    }

    fn sync_stats(&mut self) {
        self.stats.raster_count = self.rasters.len();
        self.stats.memory_used = self.memory_used;
    }

    fn evict_lru(&mut self) -> Option<CachedRaster> {
        let key = self.lru_queue.pop_front()?;
        let raster = self.rasters.remove(&key)?;
        self.memory_used = self.memory_used.saturating_sub(raster.memory_size());
        self.stats.evictions += 1;
        self.sync_stats();
        Some(raster)
    }

    fn evict_to_fit(&mut self, required_size: usize) {
        while self.memory_used + required_size > self.memory_limit && !self.rasters.is_empty() {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }

    /// Store a raster, evicting least recently used entries if needed
    ///
    /// A raster larger than the whole limit is not stored.
    pub fn put(&mut self, key: RasterKey, pixels: Vec<u8>, width: u32, height: u32) {
        let raster = CachedRaster::new(key, pixels, width, height);
        let size = raster.memory_size();

        if size > self.memory_limit {
            tracing::debug!(page = key.page, size, "raster exceeds cache limit, not cached");
            return;
        }

        if let Some(old) = self.rasters.remove(&key) {
            self.memory_used = self.memory_used.saturating_sub(old.memory_size());
            self.lru_queue.retain(|k| *k != key);
        }

        self.evict_to_fit(size);

        self.memory_used += size;
        self.rasters.insert(key, raster);
        self.touch(key);
        self.sync_stats();
    }

    /// Retrieve a raster, updating LRU order and hit statistics
    pub fn get(&mut self, key: RasterKey) -> Option<&CachedRaster> {
        if self.rasters.contains_key(&key) {
            self.touch(key);
            self.stats.hits += 1;
            self.rasters.get(&key)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Check presence without touching LRU order
    pub fn contains(&self, key: RasterKey) -> bool {
        self.rasters.contains_key(&key)
    }

    pub fn remove(&mut self, key: RasterKey) -> Option<CachedRaster> {
        let raster = self.rasters.remove(&key)?;
        self.memory_used = self.memory_used.saturating_sub(raster.memory_size());
        self.lru_queue.retain(|k| *k != key);
        self.sync_stats();
        Some(raster)
    }

    /// Distinct pages that currently have at least one cached raster
    pub fn cached_pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.rasters.keys().map(|key| key.page).collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    /// Drop every raster belonging to one of `pages`
    ///
    /// Returns the number of bytes released.
    pub fn evict_pages(&mut self, pages: &[u32]) -> usize {
        let doomed: Vec<RasterKey> = self
            .rasters
            .keys()
            .filter(|key| pages.contains(&key.page))
            .copied()
            .collect();

        let mut released = 0;
        for key in doomed {
            if let Some(raster) = self.remove(key) {
                released += raster.memory_size();
                self.stats.evictions += 1;
            }
        }
        released
    }

    /// Clear all rasters. Returns the number of bytes released.
    pub fn clear(&mut self) -> usize {
        let released = self.memory_used;
        self.rasters.clear();
        self.lru_queue.clear();
        self.memory_used = 0;
        self.sync_stats();
        released
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Update the memory limit, evicting if usage now exceeds it
    pub fn set_memory_limit(&mut self, new_limit: usize) {
        self.memory_limit = new_limit;
        self.stats.memory_limit = new_limit;
        if self.memory_used > new_limit {
            self.evict_to_fit(0);
        }
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn len(&self) -> usize {
        self.rasters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rasters.is_empty()
    }
}

impl Default for RasterCache {
    /// Create a cache with a default 256MB limit
    fn default() -> Self {
        Self::with_mb_limit(256)
    }
}
