//! Error types shared by the watcher and the graph.
//!
//! Every failure carries a machine-readable `ErrorCode` so callers can
//! log it in a structured way or decide whether to retry. The optional
//! file path and wrapped cause tell you where and why it happened.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Machine-readable classification of a `WatcherError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Import extraction or a change callback failed.
    DependencyAnalysisFailed,
    /// The native file-system subscription could not be created or errored.
    FileWatchFailed,
    /// A dependency cycle was found where one is not allowed.
    CircularDependencyDetected,
    /// Bad group id, empty pattern list, bad glob, or duplicate registration.
    InvalidWatchGroup,
    /// The import-extraction backend could not be set up.
    BackendInitializationFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependencyAnalysisFailed => "DEPENDENCY_ANALYSIS_FAILED",
            Self::FileWatchFailed => "FILE_WATCH_FAILED",
            Self::CircularDependencyDetected => "CIRCULAR_DEPENDENCY_DETECTED",
            Self::InvalidWatchGroup => "INVALID_WATCH_GROUP",
            Self::BackendInitializationFailed => "BACKEND_INITIALIZATION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one error type the watcher surfaces.
///
/// Values are never mutated after construction: `with_path` and
/// `with_source` consume the error and hand back a new one.
#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct WatcherError {
    code: ErrorCode,
    message: String,
    file_path: Option<PathBuf>,
    #[source]
    source: Option<BoxError>,
}

impl WatcherError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            file_path: None,
            source: None,
        }
    }

    pub fn dependency_analysis(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DependencyAnalysisFailed, message)
    }

    pub fn file_watch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FileWatchFailed, message)
    }

    pub fn circular_dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CircularDependencyDetected, message)
    }

    pub fn invalid_watch_group(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidWatchGroup, message)
    }

    pub fn backend_initialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BackendInitializationFailed, message)
    }

    /// Attaches the file the error is about.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
}

impl From<ExtractError> for WatcherError {
    fn from(err: ExtractError) -> Self {
        let code = match &err {
            ExtractError::Initialization(_) => ErrorCode::BackendInitializationFailed,
            _ => ErrorCode::DependencyAnalysisFailed,
        };
        let path = err.path().map(Path::to_path_buf);
        let error = WatcherError::new(code, format!("import extraction failed: {}", err));
        let error = match path {
            Some(path) => error.with_path(path),
            None => error,
        };
        error.with_source(err)
    }
}

/// Things that can go wrong while extracting imports.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Couldn't read a source file.
    #[error("failed to read file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tree-sitter gave up on a file.
    #[error("failed to parse '{path}': {reason}")]
    Parser { path: PathBuf, reason: String },

    /// The parser backend itself could not be set up.
    #[error("extractor initialization failed: {0}")]
    Initialization(String),
}

impl ExtractError {
    /// Creates an IO error with the path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. } | Self::Parser { path, .. } => Some(path),
            Self::Initialization(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_display_matches_serde() {
        let code = ErrorCode::InvalidWatchGroup;
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(code.to_string(), "INVALID_WATCH_GROUP");
        assert_eq!(json, "\"INVALID_WATCH_GROUP\"");

        let json = serde_json::to_string(&ErrorCode::BackendInitializationFailed).unwrap();
        assert_eq!(json, "\"BACKEND_INITIALIZATION_FAILED\"");
    }

    #[test]
    fn test_builder_keeps_code_and_message() {
        let err = WatcherError::file_watch("watch failed")
            .with_path("/tmp/a.ts")
            .with_source(std::io::Error::new(std::io::ErrorKind::Other, "boom"));

        assert_eq!(err.code(), ErrorCode::FileWatchFailed);
        assert_eq!(err.message(), "watch failed");
        assert_eq!(err.file_path(), Some(Path::new("/tmp/a.ts")));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "[FILE_WATCH_FAILED] watch failed");
    }

    #[test]
    fn test_extract_error_code_mapping() {
        let init: WatcherError = ExtractError::Initialization("no grammar".into()).into();
        assert_eq!(init.code(), ErrorCode::BackendInitializationFailed);
        assert!(init.file_path().is_none());

        let parse: WatcherError = ExtractError::Parser {
            path: PathBuf::from("/src/a.ts"),
            reason: "no tree".into(),
        }
        .into();
        assert_eq!(parse.code(), ErrorCode::DependencyAnalysisFailed);
        assert_eq!(parse.file_path(), Some(Path::new("/src/a.ts")));
    }
}
