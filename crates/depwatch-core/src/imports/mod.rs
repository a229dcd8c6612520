//! Static-import extraction.
//!
//! The graph never reads source code itself. It hands a list of files to
//! an `ImportExtractor` and gets back an `ImportTree`: for each file, the
//! files it statically imports. Anything that can produce that map can
//! drive the watcher.

mod cycles;
mod resolve;
mod typescript;

use crate::error::ExtractError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use cycles::find_cycles;
pub use resolve::resolve_specifier;
pub use typescript::TypeScriptExtractor;

/// The external static-import extraction facility.
///
/// `extract` is called once per graph build with the whole file set.
/// Implementations should be free of side effects.
pub trait ImportExtractor: Send + Sync {
    /// Maps every input file to the files it imports.
    fn extract(&self, files: &[PathBuf]) -> Result<ImportTree, ExtractError>;

    /// Enumerates the import cycles in a previously extracted tree.
    fn circular(&self, tree: &ImportTree) -> Result<Vec<Vec<PathBuf>>, ExtractError> {
        Ok(find_cycles(tree))
    }
}

/// Result of one extraction pass.
#[derive(Debug, Clone, Default)]
pub struct ImportTree {
    imports: BTreeMap<PathBuf, Vec<PathBuf>>,
    skipped: Vec<PathBuf>,
}

impl ImportTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the imports of one file, replacing any previous entry.
    pub fn insert(&mut self, file: impl Into<PathBuf>, imports: Vec<PathBuf>) {
        self.imports.insert(file.into(), imports);
    }

    /// Records a file that could not be read or parsed.
    pub fn record_skipped(&mut self, file: impl Into<PathBuf>) {
        self.skipped.push(file.into());
    }

    pub fn get(&self, file: &Path) -> Option<&[PathBuf]> {
        self.imports.get(file).map(Vec::as_slice)
    }

    /// Iterates files in path order together with their imports.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Vec<PathBuf>)> {
        self.imports.iter()
    }

    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.imports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}

impl FromIterator<(PathBuf, Vec<PathBuf>)> for ImportTree {
    fn from_iter<I: IntoIterator<Item = (PathBuf, Vec<PathBuf>)>>(iter: I) -> Self {
        Self {
            imports: iter.into_iter().collect(),
            skipped: Vec::new(),
        }
    }
}

/// File extensions the built-in extractor understands.
pub fn supported_extensions() -> &'static [&'static str] {
    &[
        "ts", "tsx", "mts", "cts", // TypeScript
        "js", "jsx", "mjs", "cjs", // JavaScript
    ]
}

/// Checks if a file extension is supported by the built-in extractor.
pub fn is_supported(extension: &str) -> bool {
    let extension = extension.to_lowercase();
    supported_extensions().contains(&extension.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported() {
        assert!(is_supported("ts"));
        assert!(is_supported("TSX"));
        assert!(is_supported("mjs"));
        assert!(!is_supported("rs"));
        assert!(!is_supported("json"));
    }

    #[test]
    fn test_tree_from_iter() {
        let tree: ImportTree = vec![
            (PathBuf::from("/a.ts"), vec![PathBuf::from("/b.ts")]),
            (PathBuf::from("/b.ts"), vec![]),
        ]
        .into_iter()
        .collect();

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(Path::new("/a.ts")), Some(&[PathBuf::from("/b.ts")][..]));
        assert!(tree.skipped().is_empty());
    }

    #[test]
    fn test_default_circular_uses_cycle_finder() {
        struct Fixed;

        impl ImportExtractor for Fixed {
            fn extract(&self, _files: &[PathBuf]) -> Result<ImportTree, ExtractError> {
                Ok(ImportTree::new())
            }
        }

        let tree: ImportTree = vec![
            (PathBuf::from("/a.ts"), vec![PathBuf::from("/b.ts")]),
            (PathBuf::from("/b.ts"), vec![PathBuf::from("/a.ts")]),
        ]
        .into_iter()
        .collect();

        let cycles = Fixed.circular(&tree).unwrap();
        assert_eq!(cycles.len(), 1);
    }
}
