//! Depwatch Watcher - dependency-aware file watching
//!
//! This crate ties the graph to the file system:
//! - Resolving watch-group glob patterns to files
//! - Subscribing to native file-system events
//! - Debouncing bursts of events per file
//! - Working out which files and groups a change affects
//! - Calling each affected group's callback, one at a time
//!
//! # Example
//!
//! ```no_run
//! use depwatch_watcher::{DependencyWatcher, FileChangeInfo, ImpactAnalysisResult, WatcherConfig};
//!
//! # async fn run() -> Result<(), depwatch_core::WatcherError> {
//! let watcher = DependencyWatcher::new(WatcherConfig::default());
//! watcher.on_error(|err| eprintln!("{}", err));
//! watcher
//!     .add_watch_group("schema", ["src/schema/**/*.ts"], |info: FileChangeInfo, impact: ImpactAnalysisResult| async move {
//!         println!("{} changed, {} files affected", info.file_path.display(), impact.affected_files.len());
//!         Ok::<(), anyhow::Error>(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod debounce;
mod event;
mod group;
mod impact;
mod signals;
mod source;
mod watcher;

pub use config::WatcherConfig;
pub use event::{ChangeCallback, ErrorSink, FileChangeInfo, FileEvent};
pub use group::{PatternSet, WatchGroup};
pub use impact::ImpactAnalysisResult;
pub use signals::shutdown_signal;
pub use watcher::{DependencyWatcher, WatchStatus};

pub use depwatch_core::{ErrorCode, WatcherError};
pub use depwatch_graph::{CacheStats, GraphStats};
