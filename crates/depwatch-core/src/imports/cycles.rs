//! Import cycle enumeration.
//!
//! Cycles are reported per strongly-connected component: one walk per
//! component with more than one file, plus one for each file that
//! imports itself. That keeps the count stable no matter how many
//! distinct loops share the same files.

use super::ImportTree;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Finds the import cycles in a tree.
///
/// Each cycle starts at the smallest path in its component and lists
/// files in import order; the last file imports the first. The result
/// is sorted so repeated calls agree.
pub fn find_cycles(tree: &ImportTree) -> Vec<Vec<PathBuf>> {
    let mut graph: DiGraph<&Path, ()> = DiGraph::new();
    let mut index: HashMap<&Path, NodeIndex> = HashMap::new();

    for (file, imports) in tree.iter() {
        let from = node_for(&mut graph, &mut index, file);
        for imported in imports {
            let to = node_for(&mut graph, &mut index, imported);
            graph.update_edge(from, to, ());
        }
    }

    let mut cycles = Vec::new();

    for component in kosaraju_scc(&graph) {
        if component.len() == 1 {
            let node = component[0];
            if graph.contains_edge(node, node) {
                cycles.push(vec![graph[node].to_path_buf()]);
            }
            continue;
        }

        let members: HashSet<NodeIndex> = component.iter().copied().collect();
        let start = match component.iter().copied().min_by_key(|n| graph[*n]) {
            Some(start) => start,
            None => continue,
        };

        let walk = cycle_through(&graph, start, &members);
        if !walk.is_empty() {
            cycles.push(walk.into_iter().map(|n| graph[n].to_path_buf()).collect());
        }
    }

    cycles.sort();
    cycles
}

fn node_for<'a>(
    graph: &mut DiGraph<&'a Path, ()>,
    index: &mut HashMap<&'a Path, NodeIndex>,
    path: &'a Path,
) -> NodeIndex {
    *index.entry(path).or_insert_with(|| graph.add_node(path))
}

/// Depth-first search for a path that leaves `start` and comes back.
///
/// `frontier[i]` holds the unexplored neighbours of `path[i]`, so the
/// search needs no recursion however large the component is.
fn cycle_through(
    graph: &DiGraph<&Path, ()>,
    start: NodeIndex,
    members: &HashSet<NodeIndex>,
) -> Vec<NodeIndex> {
    let mut path = vec![start];
    let mut visited = HashSet::from([start]);
    let mut frontier = vec![sorted_neighbors(graph, start, members).into_iter()];

    while let Some(neighbors) = frontier.last_mut() {
        match neighbors.next() {
            Some(neighbor) if neighbor == start => return path,
            Some(neighbor) => {
                if visited.insert(neighbor) {
                    path.push(neighbor);
                    frontier.push(sorted_neighbors(graph, neighbor, members).into_iter());
                }
            }
            None => {
                frontier.pop();
                path.pop();
            }
        }
    }

    Vec::new()
}

fn sorted_neighbors(
    graph: &DiGraph<&Path, ()>,
    node: NodeIndex,
    members: &HashSet<NodeIndex>,
) -> Vec<NodeIndex> {
    let mut next: Vec<NodeIndex> = graph
        .neighbors(node)
        .filter(|n| members.contains(n))
        .collect();
    next.sort_by_key(|n| graph[*n]);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(edges: &[(&str, &[&str])]) -> ImportTree {
        edges
            .iter()
            .map(|(file, imports)| {
                (
                    PathBuf::from(file),
                    imports.iter().map(PathBuf::from).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_acyclic_tree_has_no_cycles() {
        let t = tree(&[("/a.ts", &["/b.ts"]), ("/b.ts", &["/c.ts"]), ("/c.ts", &[])]);
        assert!(find_cycles(&t).is_empty());
    }

    #[test]
    fn test_two_file_cycle() {
        let t = tree(&[("/b.ts", &["/a.ts"]), ("/a.ts", &["/b.ts"])]);
        let cycles = find_cycles(&t);

        assert_eq!(
            cycles,
            vec![vec![PathBuf::from("/a.ts"), PathBuf::from("/b.ts")]]
        );
    }

    #[test]
    fn test_self_import() {
        let t = tree(&[("/a.ts", &["/a.ts"])]);
        assert_eq!(find_cycles(&t), vec![vec![PathBuf::from("/a.ts")]]);
    }

    #[test]
    fn test_three_file_cycle_walks_in_import_order() {
        // a -> b -> c -> a, plus a tail d -> a that is not part of it
        let t = tree(&[
            ("/a.ts", &["/b.ts"]),
            ("/b.ts", &["/c.ts"]),
            ("/c.ts", &["/a.ts"]),
            ("/d.ts", &["/a.ts"]),
        ]);
        let cycles = find_cycles(&t);

        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0],
            vec![
                PathBuf::from("/a.ts"),
                PathBuf::from("/b.ts"),
                PathBuf::from("/c.ts")
            ]
        );
    }

    #[test]
    fn test_separate_components_reported_separately() {
        let t = tree(&[
            ("/a.ts", &["/b.ts"]),
            ("/b.ts", &["/a.ts"]),
            ("/x.ts", &["/y.ts"]),
            ("/y.ts", &["/x.ts"]),
        ]);
        assert_eq!(find_cycles(&t).len(), 2);
    }

    #[test]
    fn test_large_ring_is_walked_without_recursion() {
        const SIZE: usize = 50_000;
        let file = |i: usize| PathBuf::from(format!("/f{:06}.ts", i));
        let t: ImportTree = (0..SIZE)
            .map(|i| (file(i), vec![file((i + 1) % SIZE)]))
            .collect();

        let cycles = find_cycles(&t);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), SIZE);
        assert_eq!(cycles[0].first(), Some(&file(0)));
        assert_eq!(cycles[0].last(), Some(&file(SIZE - 1)));
    }

    #[test]
    fn test_dead_end_branch_is_backtracked() {
        // a -> b, b -> c and d, c -> b, d -> a. From b the walk tries c
        // first, finds only b again and has to back out before taking d.
        let t = tree(&[
            ("/a.ts", &["/b.ts"]),
            ("/b.ts", &["/c.ts", "/d.ts"]),
            ("/c.ts", &["/b.ts"]),
            ("/d.ts", &["/a.ts"]),
        ]);
        let cycles = find_cycles(&t);

        assert_eq!(
            cycles,
            vec![vec![
                PathBuf::from("/a.ts"),
                PathBuf::from("/b.ts"),
                PathBuf::from("/d.ts")
            ]]
        );
    }
}
