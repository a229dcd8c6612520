//! Depwatch Graph - file-level dependency tracking
//!
//! This crate owns the in-memory graph of which files import which.
//! Edges are kept in both directions so "what does this file need" and
//! "what breaks if this file changes" are equally cheap to answer.
//!
//! The `ImpactCache` sits next to it and memoizes transitive dependent
//! sets until the graph changes.

mod cache;
mod graph;
mod node;

pub use cache::{CacheStats, ImpactCache, DEFAULT_CACHE_SIZE};
pub use graph::{DependencyGraph, GraphStats};
pub use node::{DependencyNode, Direction};
