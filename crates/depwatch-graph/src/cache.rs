//! Bounded impact cache.
//!
//! Maps a changed file to its transitive dependents. Entries are evicted
//! oldest-first once the bound is reached, and the whole cache is
//! cleared whenever the graph changes shape.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default bound on cached impact sets.
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// Counters exposed for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

/// FIFO-bounded memo of `file -> transitive dependents`.
#[derive(Debug)]
pub struct ImpactCache {
    capacity: usize,
    entries: HashMap<PathBuf, Vec<PathBuf>>,
    /// Insertion order, oldest first.
    order: VecDeque<PathBuf>,
    hits: u64,
    misses: u64,
}

impl Default for ImpactCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl ImpactCache {
    /// Creates a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity.min(1024)),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up a cached impact set, counting the hit or miss.
    pub fn get(&mut self, file: &Path) -> Option<Vec<PathBuf>> {
        match self.entries.get(file) {
            Some(dependents) => {
                self.hits += 1;
                Some(dependents.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Stores an impact set. Re-inserting a key keeps its existing slot.
    pub fn insert(&mut self, file: PathBuf, dependents: Vec<PathBuf>) {
        if let Some(existing) = self.entries.get_mut(&file) {
            *existing = dependents;
            return;
        }

        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    debug!("Evicting impact cache entry {}", oldest.display());
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.order.push_back(file.clone());
        self.entries.insert(file, dependents);
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn contains(&self, file: &Path) -> bool {
        self.entries.contains_key(file)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
            capacity: self.capacity,
        }
    }
}
