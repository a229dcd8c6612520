//! Depwatch Core - shared error types and import extraction
//!
//! This crate holds the pieces every other depwatch crate leans on:
//! - The `WatcherError` taxonomy with machine-readable codes
//! - The static-import extraction contract (`ImportExtractor`)
//! - A Tree-sitter based extractor for TypeScript and JavaScript
//!
//! # Example
//!
//! ```no_run
//! use depwatch_core::{ImportExtractor, TypeScriptExtractor};
//! use std::path::PathBuf;
//!
//! let files = vec![PathBuf::from("/project/src/index.ts")];
//! let tree = TypeScriptExtractor::new().extract(&files).unwrap();
//! for (file, imports) in tree.iter() {
//!     println!("{} imports {} files", file.display(), imports.len());
//! }
//! ```

pub mod error;
pub mod imports;

pub use error::{ErrorCode, ExtractError, WatcherError};
pub use imports::{
    find_cycles, is_supported, ImportExtractor, ImportTree, TypeScriptExtractor,
};
