//! Watch groups and glob pattern resolution.
//!
//! A group is a named pattern list plus the files those patterns matched.
//! Patterns are anchored at the configured root, `*` never crosses a
//! directory separator, and a leading `!` turns a pattern into an
//! exclusion.

use depwatch_core::WatcherError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Compiled form of a group's patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    raw: Vec<String>,
    include: GlobSet,
    exclude: GlobSet,
    /// Patterns without glob syntax, matched by exact path.
    literals: HashSet<PathBuf>,
    /// Directories to walk when resolving globs.
    walk_bases: Vec<PathBuf>,
    /// Directories the native watcher has to cover.
    watch_bases: Vec<PathBuf>,
}

impl PatternSet {
    /// Compiles `patterns`, anchoring relative ones at `root`.
    pub fn compile(root: &Path, patterns: &[String]) -> Result<Self, WatcherError> {
        let root = canonical_path(root, root);
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();
        let mut literals = HashSet::new();
        let mut walk_bases = Vec::new();
        let mut watch_bases = Vec::new();

        for raw in patterns {
            let trimmed = raw.trim();
            let (negated, body) = match trimmed.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, trimmed),
            };
            if body.is_empty() {
                return Err(WatcherError::invalid_watch_group(format!(
                    "empty glob pattern '{}'",
                    raw
                )));
            }

            let absolute = root.join(body);
            let (base, rest) = split_base(&absolute);
            let base = canonical_path(&root, &base);

            let glob_text = match rest {
                Some(rest) => base.join(rest),
                None if base.is_dir() => base.join("**"),
                None => {
                    if negated {
                        base.clone()
                    } else {
                        if let Some(parent) = base.parent() {
                            push_unique(&mut watch_bases, parent.to_path_buf());
                        }
                        literals.insert(base);
                        continue;
                    }
                }
            };

            let glob = GlobBuilder::new(&glob_text.to_string_lossy())
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    WatcherError::invalid_watch_group(format!("invalid glob pattern '{}'", raw))
                        .with_source(e)
                })?;

            if negated {
                exclude.add(glob);
            } else {
                include.add(glob);
                push_unique(&mut walk_bases, base.clone());
                push_unique(&mut watch_bases, base);
            }
        }

        let build = |builder: GlobSetBuilder| {
            builder.build().map_err(|e| {
                WatcherError::invalid_watch_group("failed to compile glob patterns").with_source(e)
            })
        };

        Ok(Self {
            raw: patterns.to_vec(),
            include: build(include)?,
            exclude: build(exclude)?,
            literals,
            walk_bases,
            watch_bases,
        })
    }

    /// Whether an absolute, canonical path belongs to this set.
    pub fn matches(&self, path: &Path) -> bool {
        let included = self.literals.contains(path) || self.include.is_match(path);
        included && !self.exclude.is_match(path)
    }

    /// The patterns as registered.
    pub fn patterns(&self) -> &[String] {
        &self.raw
    }

    pub fn watch_bases(&self) -> &[PathBuf] {
        &self.watch_bases
    }

    /// Lists every existing file the patterns match. Walks the file
    /// system, so call it off the async executor.
    pub fn resolve(&self, respect_gitignore: bool) -> BTreeSet<PathBuf> {
        let mut files = BTreeSet::new();

        for literal in &self.literals {
            if literal.is_file() && !self.exclude.is_match(literal) {
                files.insert(literal.clone());
            }
        }

        for base in &self.walk_bases {
            if !base.exists() {
                debug!("Pattern base {} does not exist yet", base.display());
                continue;
            }

            let walker = WalkBuilder::new(base)
                .hidden(false)
                .parents(respect_gitignore)
                .ignore(respect_gitignore)
                .git_ignore(respect_gitignore)
                .git_global(respect_gitignore)
                .git_exclude(respect_gitignore)
                .filter_entry(|entry| entry.file_name() != ".git")
                .build();

            for entry in walker.filter_map(Result::ok) {
                let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                if is_file && self.matches(entry.path()) {
                    files.insert(canonical_path(base, entry.path()));
                }
            }
        }

        files
    }
}

/// Splits a path at the first component containing glob syntax.
///
/// Returns the literal directory prefix and the remaining pattern, or
/// the whole path and None when there is no glob syntax at all.
fn split_base(path: &Path) -> (PathBuf, Option<PathBuf>) {
    let mut base = PathBuf::new();
    let mut rest = PathBuf::new();
    let mut in_glob = false;

    for component in path.components() {
        if matches!(component, Component::CurDir) {
            continue;
        }
        if !in_glob && is_glob(&component.as_os_str().to_string_lossy()) {
            in_glob = true;
        }
        if in_glob {
            rest.push(component);
        } else {
            base.push(component);
        }
    }

    if in_glob {
        (base, Some(rest))
    } else {
        (base, None)
    }
}

fn is_glob(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '{'])
}

fn push_unique(list: &mut Vec<PathBuf>, path: PathBuf) {
    if !list.contains(&path) {
        list.push(path);
    }
}

/// Canonicalizes a path, tolerating files that no longer exist.
///
/// Relative paths are taken relative to `root`. For a deleted file the
/// parent directory is canonicalized instead, so unlink events still
/// line up with the paths recorded while the file existed.
pub(crate) fn canonical_path(root: &Path, path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    if let Ok(canonical) = absolute.canonicalize() {
        return canonical;
    }

    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => parent.join(name),
            Err(_) => absolute,
        },
        _ => absolute,
    }
}

/// A named set of files bound to one callback.
#[derive(Debug, Clone)]
pub struct WatchGroup {
    pub id: String,
    pub matcher: PatternSet,
    pub files: BTreeSet<PathBuf>,
}

impl WatchGroup {
    pub fn new(id: impl Into<String>, matcher: PatternSet, files: BTreeSet<PathBuf>) -> Self {
        Self {
            id: id.into(),
            matcher,
            files,
        }
    }

    pub fn patterns(&self) -> &[String] {
        self.matcher.patterns()
    }
}

/// Groups in registration order.
#[derive(Debug, Default)]
pub(crate) struct WatchGroupRegistry {
    groups: Vec<WatchGroup>,
}

impl WatchGroupRegistry {
    pub fn contains(&self, id: &str) -> bool {
        self.groups.iter().any(|g| g.id == id)
    }

    pub fn insert(&mut self, group: WatchGroup) {
        self.groups.push(group);
    }

    pub fn remove(&mut self, id: &str) -> Option<WatchGroup> {
        let index = self.groups.iter().position(|g| g.id == id)?;
        Some(self.groups.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchGroup> {
        self.groups.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WatchGroup> {
        self.groups.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Sum of every group's file count; shared files count once per group.
    pub fn file_count(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }

    /// Union of all groups' files, sorted.
    pub fn all_files(&self) -> Vec<PathBuf> {
        let union: BTreeSet<&PathBuf> = self.groups.iter().flat_map(|g| g.files.iter()).collect();
        union.into_iter().cloned().collect()
    }

    /// Ids of groups owning at least one of `files`, in registration order.
    pub fn intersecting(&self, files: &[PathBuf]) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| files.iter().any(|f| g.files.contains(f)))
            .map(|g| g.id.clone())
            .collect()
    }

    /// Adds a new file to every group whose patterns match it.
    pub fn enroll(&mut self, file: &Path) -> Vec<String> {
        let mut enrolled = Vec::new();
        for group in &mut self.groups {
            if group.matcher.matches(file) && group.files.insert(file.to_path_buf()) {
                enrolled.push(group.id.clone());
            }
        }
        enrolled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::write(root.join("src/a.ts"), "").unwrap();
        fs::write(root.join("src/b.ts"), "").unwrap();
        fs::write(root.join("src/b.test.ts"), "").unwrap();
        fs::write(root.join("src/nested/c.ts"), "").unwrap();
        fs::write(root.join("src/readme.md"), "").unwrap();
        (dir, root)
    }

    #[test]
    fn test_split_base() {
        let (base, rest) = split_base(Path::new("/p/src/**/*.ts"));
        assert_eq!(base, PathBuf::from("/p/src"));
        assert_eq!(rest, Some(PathBuf::from("**/*.ts")));

        let (base, rest) = split_base(Path::new("/p/src/a.ts"));
        assert_eq!(base, PathBuf::from("/p/src/a.ts"));
        assert!(rest.is_none());
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let (_dir, root) = fixture();
        let set = PatternSet::compile(&root, &patterns(&["src/*.ts"])).unwrap();
        let files = set.resolve(true);

        assert!(files.contains(&root.join("src/a.ts")));
        assert!(!files.contains(&root.join("src/nested/c.ts")));
        assert!(!files.contains(&root.join("src/readme.md")));
    }

    #[test]
    fn test_globstar_and_exclusion() {
        let (_dir, root) = fixture();
        let set =
            PatternSet::compile(&root, &patterns(&["src/**/*.ts", "!**/*.test.ts"])).unwrap();
        let files = set.resolve(true);

        assert_eq!(files.len(), 3);
        assert!(files.contains(&root.join("src/nested/c.ts")));
        assert!(!files.contains(&root.join("src/b.test.ts")));
    }

    #[test]
    fn test_literal_file_pattern() {
        let (_dir, root) = fixture();
        let set = PatternSet::compile(&root, &patterns(&["src/a.ts"])).unwrap();
        let files = set.resolve(true);

        assert_eq!(files.into_iter().collect::<Vec<_>>(), vec![root.join("src/a.ts")]);
        assert_eq!(set.watch_bases(), &[root.join("src")]);
        assert!(set.matches(&root.join("src/a.ts")));
        assert!(!set.matches(&root.join("src/b.ts")));
    }

    #[test]
    fn test_directory_pattern_watches_everything_below() {
        let (_dir, root) = fixture();
        let set = PatternSet::compile(&root, &patterns(&["src/nested"])).unwrap();
        let files = set.resolve(true);

        assert_eq!(files.len(), 1);
        assert!(set.matches(&root.join("src/nested/new.ts")));
    }

    #[test]
    fn test_missing_base_resolves_to_nothing() {
        let (_dir, root) = fixture();
        let set = PatternSet::compile(&root, &patterns(&["generated/**/*.ts"])).unwrap();
        assert!(set.resolve(true).is_empty());
        assert!(set.matches(&root.join("generated/x.ts")));
    }

    #[test]
    fn test_invalid_patterns_are_rejected() {
        let (_dir, root) = fixture();
        let err = PatternSet::compile(&root, &patterns(&["src/[.ts"])).unwrap_err();
        assert_eq!(err.code(), depwatch_core::ErrorCode::InvalidWatchGroup);

        let err = PatternSet::compile(&root, &patterns(&["  "])).unwrap_err();
        assert_eq!(err.code(), depwatch_core::ErrorCode::InvalidWatchGroup);
    }

    #[test]
    fn test_canonical_path_of_deleted_file() {
        let (_dir, root) = fixture();
        let gone = root.join("src/gone.ts");
        assert_eq!(canonical_path(&root, &gone), gone);
        assert_eq!(canonical_path(&root, Path::new("src/a.ts")), root.join("src/a.ts"));
    }

    #[test]
    fn test_registry_order_and_intersection() {
        let (_dir, root) = fixture();
        let mut registry = WatchGroupRegistry::default();
        let a = root.join("src/a.ts");
        let b = root.join("src/b.ts");

        let set = PatternSet::compile(&root, &patterns(&["src/*.ts"])).unwrap();
        registry.insert(WatchGroup::new("second", set.clone(), BTreeSet::from([b.clone()])));
        registry.insert(WatchGroup::new("first", set, BTreeSet::from([a.clone(), b.clone()])));

        assert_eq!(registry.file_count(), 3);
        assert_eq!(registry.all_files(), vec![a.clone(), b.clone()]);
        assert_eq!(registry.intersecting(&[a.clone()]), vec!["first".to_string()]);
        assert_eq!(
            registry.intersecting(&[b.clone()]),
            vec!["second".to_string(), "first".to_string()]
        );

        let added = root.join("src/new.ts");
        assert_eq!(registry.enroll(&added).len(), 2);
        assert!(registry.remove("second").is_some());
        assert!(!registry.contains("second"));
        assert_eq!(registry.len(), 1);
    }
}
