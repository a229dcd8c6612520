//! Watcher configuration.

use depwatch_graph::DEFAULT_CACHE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for a `DependencyWatcher`.
///
/// Every field has a default, so a partial JSON object (or `{}`) is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Quiet period before a burst of events on one file is delivered.
    pub debounce_ms: u64,

    /// Maximum number of cached impact sets.
    pub max_cache_size: usize,

    /// Log import cycles after every graph rebuild.
    pub detect_circular: bool,

    /// Base directory for relative patterns. Defaults to the current
    /// working directory.
    pub root: Option<PathBuf>,

    /// Skip files excluded by .gitignore and friends when resolving patterns.
    pub respect_gitignore: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            max_cache_size: DEFAULT_CACHE_SIZE,
            detect_circular: true,
            root: None,
            respect_gitignore: true,
        }
    }
}

impl WatcherConfig {
    pub fn debounce_time(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// The directory relative patterns are resolved against.
    pub fn root_dir(&self) -> PathBuf {
        self.root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn with_cache_size(mut self, max_cache_size: usize) -> Self {
        self.max_cache_size = max_cache_size;
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WatcherConfig::default();
        assert_eq!(config.debounce_time(), Duration::from_millis(100));
        assert_eq!(config.max_cache_size, DEFAULT_CACHE_SIZE);
        assert!(config.detect_circular);
        assert!(config.respect_gitignore);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: WatcherConfig =
            serde_json::from_str(r#"{ "debounce_ms": 250, "root": "/project" }"#).unwrap();

        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.root_dir(), PathBuf::from("/project"));
        assert_eq!(config.max_cache_size, DEFAULT_CACHE_SIZE);
    }

    #[test]
    fn test_builders() {
        let config = WatcherConfig::default()
            .with_debounce(Duration::from_millis(5))
            .with_cache_size(2)
            .with_root("/tmp");

        assert_eq!(config.debounce_ms, 5);
        assert_eq!(config.max_cache_size, 2);
        assert_eq!(config.root, Some(PathBuf::from("/tmp")));
    }
}
