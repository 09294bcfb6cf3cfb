//! Kernel row cache
//!
//! Provides an LRU cache of kernel matrix rows so the SMO solver does not
//! recompute K(i, *) every time sample i takes part in an update.

use crate::kernel::Kernel;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// LRU cache of kernel rows, keyed by sample index
pub struct KernelCache {
    rows: LruCache<usize, Arc<[f64]>>,
    hits: u64,
    misses: u64,
}

impl KernelCache {
    /// Create a new kernel cache holding at most `capacity` rows
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            rows: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Get a cached row
    pub fn get(&mut self, i: usize) -> Option<Arc<[f64]>> {
        if let Some(row) = self.rows.get(&i) {
            self.hits += 1;
            Some(Arc::clone(row))
        } else {
            self.misses += 1;
            None
        }
    }

    /// Put a row into the cache
    pub fn put(&mut self, i: usize, row: Arc<[f64]>) {
        self.rows.put(i, row);
    }

    /// Row K(i, *) over `points`, computed on a miss
    pub fn row<K: Kernel + ?Sized>(
        &mut self,
        kernel: &K,
        points: &[Vec<f64>],
        i: usize,
    ) -> Arc<[f64]> {
        if let Some(row) = self.get(i) {
            return row;
        }
        let row: Arc<[f64]> = points
            .iter()
            .map(|p| kernel.compute(&points[i], p))
            .collect();
        self.put(i, Arc::clone(&row));
        row
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity: self.rows.cap().get(),
            size: self.rows.len(),
        }
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.rows.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
}
