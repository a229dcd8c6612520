//! The file dependency graph.
//!
//! Nodes are keyed by canonical file path. Building asks the import
//! extractor about the whole file set at once; after that the graph can
//! be patched one node at a time without a rebuild.

use crate::node::{DependencyNode, Direction};
use depwatch_core::{ImportExtractor, ImportTree, WatcherError};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summary numbers for a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    /// Sum of every node's direct dependencies.
    pub edge_count: usize,
    pub circular_count: usize,
}

/// Owns the dependency graph and answers dependency/dependent queries.
pub struct DependencyGraph {
    extractor: Arc<dyn ImportExtractor>,
    nodes: HashMap<PathBuf, DependencyNode>,
}

impl DependencyGraph {
    /// Creates an empty graph backed by the given extractor.
    pub fn new(extractor: Arc<dyn ImportExtractor>) -> Self {
        Self {
            extractor,
            nodes: HashMap::new(),
        }
    }

    /// Rebuilds the graph from scratch for `files`.
    ///
    /// The extractor runs once, on a blocking thread, for the whole set.
    /// Imports of files outside the set are dropped. An empty set clears
    /// the graph without touching the extractor.
    pub async fn build_graph(&mut self, files: &[PathBuf]) -> Result<(), WatcherError> {
        if files.is_empty() {
            debug!("No files to analyze, clearing dependency graph");
            self.nodes.clear();
            return Ok(());
        }

        let start = Instant::now();
        let extractor = Arc::clone(&self.extractor);
        let input = files.to_vec();

        let tree = tokio::task::spawn_blocking(move || extractor.extract(&input))
            .await
            .map_err(|e| {
                WatcherError::dependency_analysis("import extraction task did not complete")
                    .with_source(e)
            })??;

        self.apply(files, &tree);

        info!(
            "Built dependency graph: {} nodes, {} edges in {:?}",
            self.node_count(),
            self.edge_count(),
            start.elapsed()
        );
        if !tree.skipped().is_empty() {
            debug!("{} files skipped during extraction", tree.skipped().len());
        }

        Ok(())
    }

    fn apply(&mut self, files: &[PathBuf], tree: &ImportTree) {
        self.nodes.clear();
        for file in files {
            self.add_node(file.clone());
        }

        for (file, imports) in tree.iter() {
            for imported in imports {
                self.add_dependency(file, imported);
            }
        }
    }

    /// Adds an isolated node. Returns false if it was already present.
    pub fn add_node(&mut self, file: impl Into<PathBuf>) -> bool {
        let file = file.into();
        if self.nodes.contains_key(&file) {
            return false;
        }
        debug!("Adding graph node {}", file.display());
        self.nodes.insert(file.clone(), DependencyNode::new(file));
        true
    }

    /// Removes a node and every edge that touches it.
    pub fn remove_node(&mut self, file: &Path) -> Option<DependencyNode> {
        let node = self.nodes.remove(file)?;

        for dependency in &node.dependencies {
            if let Some(other) = self.nodes.get_mut(dependency) {
                other.dependents.remove(file);
            }
        }
        for dependent in &node.dependents {
            if let Some(other) = self.nodes.get_mut(dependent) {
                other.dependencies.remove(file);
            }
        }

        debug!("Removed graph node {}", file.display());
        Some(node)
    }

    /// Records that `file` imports `imported`.
    ///
    /// Both nodes must already exist; otherwise nothing changes and
    /// false is returned.
    pub fn add_dependency(&mut self, file: &Path, imported: &Path) -> bool {
        if !self.nodes.contains_key(file) || !self.nodes.contains_key(imported) {
            return false;
        }

        if let Some(node) = self.nodes.get_mut(file) {
            node.dependencies.insert(imported.to_path_buf());
        }
        if let Some(node) = self.nodes.get_mut(imported) {
            node.dependents.insert(file.to_path_buf());
        }
        true
    }

    /// Every file that depends on `file`, directly or transitively.
    pub fn get_dependents(&self, file: &Path) -> Vec<PathBuf> {
        self.closure(file, Direction::Dependents)
    }

    /// Every file `file` depends on, directly or transitively.
    pub fn get_dependencies(&self, file: &Path) -> Vec<PathBuf> {
        self.closure(file, Direction::Dependencies)
    }

    /// Depth-first walk in pre-order. The start file is never part of the
    /// result and the visited set makes cycles terminate. The walk keeps
    /// its own stack, so chain length is bounded by memory only.
    fn closure(&self, start: &Path, direction: Direction) -> Vec<PathBuf> {
        let mut visited: HashSet<&Path> = HashSet::from([start]);
        let mut result = Vec::new();

        let Some(node) = self.nodes.get(start) else {
            return result;
        };
        let mut stack = vec![node.edges(direction).iter()];

        while let Some(neighbors) = stack.last_mut() {
            let Some(neighbor) = neighbors.next() else {
                stack.pop();
                continue;
            };
            if !visited.insert(neighbor.as_path()) {
                continue;
            }
            result.push(neighbor.clone());
            if let Some(next) = self.nodes.get(neighbor) {
                stack.push(next.edges(direction).iter());
            }
        }

        result
    }

    /// Asks the extractor for the import cycles among current nodes.
    ///
    /// Failures are logged and reported as no cycles.
    pub fn find_circular_dependencies(&self) -> Vec<Vec<PathBuf>> {
        let tree: ImportTree = self
            .nodes
            .values()
            .map(|node| {
                (
                    node.file_path.clone(),
                    node.dependencies.iter().cloned().collect(),
                )
            })
            .collect();

        match self.extractor.circular(&tree) {
            Ok(cycles) => cycles,
            Err(e) => {
                warn!("Circular dependency detection failed: {}", e);
                Vec::new()
            }
        }
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            circular_count: self.find_circular_dependencies().len(),
        }
    }

    pub fn node(&self, file: &Path) -> Option<&DependencyNode> {
        self.nodes.get(file)
    }

    pub fn contains(&self, file: &Path) -> bool {
        self.nodes.contains_key(file)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.dependencies.len()).sum()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edge_count())
            .finish()
    }
}
