//! Graph node representation.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Which way to follow edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards the files this file imports.
    Dependencies,
    /// Towards the files that import this file.
    Dependents,
}

/// One file in the dependency graph.
///
/// If B is in A's `dependencies`, A is in B's `dependents`. The graph
/// maintains both sides together; nodes never hold a one-sided edge.
/// Ordered sets keep traversal results deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyNode {
    pub file_path: PathBuf,
    pub dependencies: BTreeSet<PathBuf>,
    pub dependents: BTreeSet<PathBuf>,
}

impl DependencyNode {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Direct neighbours in the given direction.
    pub fn edges(&self, direction: Direction) -> &BTreeSet<PathBuf> {
        match direction {
            Direction::Dependencies => &self.dependencies,
            Direction::Dependents => &self.dependents,
        }
    }
}
