//! Impact analysis.
//!
//! Given one changed file, works out every file that (transitively)
//! depends on it and every watch group that owns any of those files.

use crate::group::WatchGroupRegistry;
use depwatch_graph::{DependencyGraph, ImpactCache};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Result of an impact analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactAnalysisResult {
    /// The file that changed.
    pub changed_file: PathBuf,

    /// The changed file first, then its transitive dependents, no repeats.
    pub affected_files: Vec<PathBuf>,

    /// Groups owning any affected file, in registration order.
    pub affected_groups: Vec<String>,
}

impl ImpactAnalysisResult {
    /// Dependents only, without the changed file itself.
    pub fn dependents(&self) -> &[PathBuf] {
        self.affected_files.get(1..).unwrap_or(&[])
    }
}

/// Computes the impact of `file`, consulting and filling the cache.
pub(crate) fn analyze(
    graph: &DependencyGraph,
    cache: &mut ImpactCache,
    groups: &WatchGroupRegistry,
    file: &Path,
) -> ImpactAnalysisResult {
    let dependents = match cache.get(file) {
        Some(dependents) => {
            trace!("Impact cache hit for {}", file.display());
            dependents
        }
        None => {
            let dependents = graph.get_dependents(file);
            cache.insert(file.to_path_buf(), dependents.clone());
            dependents
        }
    };

    let mut seen: HashSet<PathBuf> = HashSet::with_capacity(dependents.len() + 1);
    let mut affected_files = Vec::with_capacity(dependents.len() + 1);
    seen.insert(file.to_path_buf());
    affected_files.push(file.to_path_buf());
    for dependent in dependents {
        if seen.insert(dependent.clone()) {
            affected_files.push(dependent);
        }
    }

    let affected_groups = groups.intersecting(&affected_files);

    ImpactAnalysisResult {
        changed_file: file.to_path_buf(),
        affected_files,
        affected_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{PatternSet, WatchGroup};
    use depwatch_core::TypeScriptExtractor;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/src/{}.ts", name))
    }

    fn group(id: &str, files: &[&str]) -> WatchGroup {
        let matcher = PatternSet::compile(Path::new("/src"), &["*.ts".to_string()]).unwrap();
        let files: BTreeSet<PathBuf> = files.iter().map(|f| p(f)).collect();
        WatchGroup::new(id, matcher, files)
    }

    /// a imports b, b imports c.
    fn chain() -> DependencyGraph {
        let mut graph = DependencyGraph::new(Arc::new(TypeScriptExtractor::new()));
        for name in ["a", "b", "c"] {
            graph.add_node(p(name));
        }
        graph.add_dependency(&p("a"), &p("b"));
        graph.add_dependency(&p("b"), &p("c"));
        graph
    }

    #[test]
    fn test_isolated_file() {
        let mut graph = DependencyGraph::new(Arc::new(TypeScriptExtractor::new()));
        graph.add_node(p("solo"));
        let mut groups = WatchGroupRegistry::default();
        groups.insert(group("g", &["solo"]));
        let mut cache = ImpactCache::new(10);

        let impact = analyze(&graph, &mut cache, &groups, &p("solo"));
        assert_eq!(
            impact,
            ImpactAnalysisResult {
                changed_file: p("solo"),
                affected_files: vec![p("solo")],
                affected_groups: vec!["g".to_string()],
            }
        );
        assert!(impact.dependents().is_empty());
    }

    #[test]
    fn test_dependents_of_empty_result() {
        let empty = ImpactAnalysisResult {
            changed_file: p("gone"),
            affected_files: Vec::new(),
            affected_groups: Vec::new(),
        };
        assert!(empty.dependents().is_empty());
    }

    #[test]
    fn test_transitive_impact_reaches_every_owner() {
        let graph = chain();
        let mut groups = WatchGroupRegistry::default();
        groups.insert(group("api", &["a"]));
        groups.insert(group("unrelated", &["z"]));
        groups.insert(group("models", &["c"]));
        let mut cache = ImpactCache::new(10);

        let impact = analyze(&graph, &mut cache, &groups, &p("c"));
        assert_eq!(impact.affected_files, vec![p("c"), p("b"), p("a")]);
        assert_eq!(impact.affected_groups, vec!["api", "models"]);
    }

    #[test]
    fn test_second_query_is_served_from_cache() {
        let graph = chain();
        let groups = WatchGroupRegistry::default();
        let mut cache = ImpactCache::new(10);

        let first = analyze(&graph, &mut cache, &groups, &p("c"));
        let second = analyze(&graph, &mut cache, &groups, &p("c"));

        assert_eq!(first, second);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_evicted_key_is_recomputed() {
        let graph = chain();
        let groups = WatchGroupRegistry::default();
        let mut cache = ImpactCache::new(2);

        analyze(&graph, &mut cache, &groups, &p("a"));
        analyze(&graph, &mut cache, &groups, &p("b"));
        analyze(&graph, &mut cache, &groups, &p("c"));
        assert_eq!(cache.stats().misses, 3);

        // "a" was the oldest entry and got evicted
        analyze(&graph, &mut cache, &groups, &p("a"));
        assert_eq!(cache.stats().misses, 4);
        assert_eq!(cache.stats().hits, 0);
    }
}
