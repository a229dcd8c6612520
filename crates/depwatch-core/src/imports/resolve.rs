//! Import specifier resolution.
//!
//! Turns the string in `import x from './foo'` into the file on disk it
//! refers to. Package imports (`react`, `@scope/pkg`) are not files we
//! watch, so they resolve to nothing.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Resolves `specifier` as written in `importer` to a canonical file path.
///
/// Returns None for bare specifiers and for anything that doesn't exist.
pub fn resolve_specifier(importer: &Path, specifier: &str) -> Option<PathBuf> {
    let candidate = if is_relative(specifier) {
        importer.parent()?.join(specifier)
    } else if Path::new(specifier).is_absolute() {
        PathBuf::from(specifier)
    } else {
        return None;
    };

    probe(&candidate).and_then(|found| found.canonicalize().ok())
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Tries the lookup order a bundler would: exact file, added extension,
/// compiled-to-source extension swap, then a directory index.
fn probe(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }

    for ext in EXTENSIONS {
        let with_ext = append_extension(candidate, ext);
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }

    // `./foo.js` written in TypeScript usually means `./foo.ts`
    if let Some(ext) = candidate.extension().and_then(|e| e.to_str()) {
        let swaps: &[&str] = match ext {
            "js" => &["ts", "tsx"],
            "jsx" => &["tsx"],
            "mjs" => &["mts"],
            "cjs" => &["cts"],
            _ => &[],
        };
        for swap in swaps {
            let swapped = candidate.with_extension(swap);
            if swapped.is_file() {
                return Some(swapped);
            }
        }
    }

    if candidate.is_dir() {
        for ext in EXTENSIONS {
            let index = candidate.join(format!("index.{}", ext));
            if index.is_file() {
                return Some(index);
            }
        }
    }

    None
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_bare_specifier_is_ignored() {
        let dir = tempdir().unwrap();
        let importer = dir.path().join("a.ts");
        fs::write(&importer, "").unwrap();

        assert!(resolve_specifier(&importer, "react").is_none());
        assert!(resolve_specifier(&importer, "@scope/pkg").is_none());
    }

    #[test]
    fn test_resolves_added_extension() {
        let dir = tempdir().unwrap();
        let importer = dir.path().join("a.ts");
        let target = dir.path().join("user.service.ts");
        fs::write(&importer, "").unwrap();
        fs::write(&target, "").unwrap();

        let resolved = resolve_specifier(&importer, "./user.service").unwrap();
        assert_eq!(resolved, target.canonicalize().unwrap());
    }

    #[test]
    fn test_resolves_js_to_ts_swap() {
        let dir = tempdir().unwrap();
        let importer = dir.path().join("a.ts");
        let target = dir.path().join("b.ts");
        fs::write(&importer, "").unwrap();
        fs::write(&target, "").unwrap();

        let resolved = resolve_specifier(&importer, "./b.js").unwrap();
        assert_eq!(resolved, target.canonicalize().unwrap());
    }

    #[test]
    fn test_resolves_directory_index() {
        let dir = tempdir().unwrap();
        let importer = dir.path().join("a.ts");
        fs::write(&importer, "").unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        let index = dir.path().join("lib").join("index.ts");
        fs::write(&index, "").unwrap();

        let resolved = resolve_specifier(&importer, "./lib").unwrap();
        assert_eq!(resolved, index.canonicalize().unwrap());
    }

    #[test]
    fn test_resolves_parent_directory() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        let importer = dir.path().join("nested").join("a.ts");
        let target = dir.path().join("shared.ts");
        fs::write(&importer, "").unwrap();
        fs::write(&target, "").unwrap();

        let resolved = resolve_specifier(&importer, "../shared").unwrap();
        assert_eq!(resolved, target.canonicalize().unwrap());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let importer = dir.path().join("a.ts");
        fs::write(&importer, "").unwrap();

        assert!(resolve_specifier(&importer, "./missing").is_none());
    }
}
