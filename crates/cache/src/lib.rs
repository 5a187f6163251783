//! Folio Cache Library
//!
//! Page raster cache with LRU eviction and memory budget monitoring.

pub mod memory_budget;
pub mod raster;

pub use memory_budget::{MemoryBudgetConfig, MemoryMonitor, MemoryPressure, MemoryReport};
pub use raster::{CacheStats, CachedRaster, RasterCache, RasterKey};
