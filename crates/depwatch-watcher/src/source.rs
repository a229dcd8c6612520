//! Native file-system event source.
//!
//! Wraps a notify watcher. Each group's pattern bases are watched
//! recursively (shared bases are reference counted) and raw events are
//! narrowed down to add/change/unlink on paths some group cares about
//! before they leave the notify thread.
//!
//! A base that does not exist yet is parked: its nearest existing
//! ancestor is watched non-recursively until the base shows up, at which
//! point the pipeline is told to pick it up with [`EventSource::retry_pending`].

use crate::event::FileEvent;
use crate::group::PatternSet;
use depwatch_core::WatcherError;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// What the source hands to the event pipeline.
#[derive(Debug)]
pub(crate) enum SourceEvent {
    Fs { event: FileEvent, path: PathBuf },
    /// Something appeared on the way to a missing base directory.
    BaseAppeared,
    Error(notify::Error),
}

pub(crate) type Subscriptions = Arc<RwLock<HashMap<String, PatternSet>>>;

/// Missing base directory -> number of groups waiting for it.
type Pending = Arc<RwLock<HashMap<PathBuf, usize>>>;

pub(crate) struct EventSource {
    watcher: RecommendedWatcher,
    subscriptions: Subscriptions,
    /// Watched directory -> number of groups relying on it.
    roots: HashMap<PathBuf, usize>,
    pending: Pending,
    /// Ancestor watched non-recursively -> number of pending bases under it.
    parked: HashMap<PathBuf, usize>,
    /// Pending base -> the ancestor it is parked on.
    parked_on: HashMap<PathBuf, PathBuf>,
}

impl EventSource {
    /// Starts a watcher that initially watches nothing.
    pub fn new(tx: UnboundedSender<SourceEvent>) -> Result<Self, WatcherError> {
        let subscriptions: Subscriptions = Arc::new(RwLock::new(HashMap::new()));
        let pending: Pending = Arc::new(RwLock::new(HashMap::new()));
        let filter = Arc::clone(&subscriptions);
        let waiting = Arc::clone(&pending);

        let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if event.paths.iter().any(|path| leads_to_pending(&waiting, path)) {
                        let _ = tx.send(SourceEvent::BaseAppeared);
                    }
                    for (kind, path) in classify(&event) {
                        if !is_watched(&filter, &path) {
                            continue;
                        }
                        debug!("File {}: {}", kind, path.display());
                        if tx.send(SourceEvent::Fs { event: kind, path }).is_err() {
                            debug!("Event pipeline closed, dropping event");
                        }
                    }
                }
                Err(e) => {
                    warn!("Watch error: {}", e);
                    let _ = tx.send(SourceEvent::Error(e));
                }
            }
        })
        .map_err(|e| {
            WatcherError::file_watch("failed to create file system watcher").with_source(e)
        })?;

        Ok(Self {
            watcher,
            subscriptions,
            roots: HashMap::new(),
            pending,
            parked: HashMap::new(),
            parked_on: HashMap::new(),
        })
    }

    /// Starts forwarding events for a group's patterns.
    ///
    /// On failure every directory taken for this group is released again.
    pub fn subscribe(&mut self, group_id: &str, patterns: &PatternSet) -> Result<(), WatcherError> {
        let mut taken = Vec::new();
        for base in patterns.watch_bases() {
            if let Err(e) = self.watch_root(base) {
                for base in taken {
                    self.release_root(base);
                }
                return Err(e);
            }
            taken.push(base);
        }

        if let Ok(mut subscriptions) = self.subscriptions.write() {
            subscriptions.insert(group_id.to_string(), patterns.clone());
        }
        Ok(())
    }

    /// Stops forwarding events for a group and releases its directories.
    pub fn unsubscribe(&mut self, group_id: &str) {
        let removed = match self.subscriptions.write() {
            Ok(mut subscriptions) => subscriptions.remove(group_id),
            Err(_) => None,
        };

        if let Some(patterns) = removed {
            for base in patterns.watch_bases() {
                self.release_root(base);
            }
        }
    }

    /// Shared view of the subscribed patterns, for matching off the lock.
    pub fn subscriptions(&self) -> Subscriptions {
        Arc::clone(&self.subscriptions)
    }

    /// Starts watching every pending base that now exists and re-parks
    /// the rest on their nearest existing ancestor.
    ///
    /// Returns the bases that became watched. Files created inside them
    /// before the watch was in place produced no event.
    pub fn retry_pending(&mut self) -> Vec<PathBuf> {
        let waiting: Vec<(PathBuf, usize)> = match self.pending.read() {
            Ok(pending) => pending.iter().map(|(b, c)| (b.clone(), *c)).collect(),
            Err(_) => return Vec::new(),
        };

        let mut appeared = Vec::new();
        for (base, count) in waiting {
            self.unpark(&base);

            if !base.is_dir() {
                self.park(&base);
                continue;
            }

            if let Err(e) = self.add_root(&base, count) {
                warn!("Still not watching {}: {}", base.display(), e);
                self.park(&base);
                continue;
            }
            if let Ok(mut pending) = self.pending.write() {
                pending.remove(&base);
            }
            appeared.push(base);
        }
        appeared
    }

    fn watch_root(&mut self, base: &Path) -> Result<(), WatcherError> {
        if let Some(count) = self.roots.get_mut(base) {
            *count += 1;
            return Ok(());
        }

        if let Ok(mut pending) = self.pending.write() {
            if let Some(count) = pending.get_mut(base) {
                *count += 1;
                return Ok(());
            }
        }

        if base.is_dir() {
            return self.add_root(base, 1);
        }

        debug!("{} does not exist yet, waiting for it", base.display());
        if let Ok(mut pending) = self.pending.write() {
            pending.insert(base.to_path_buf(), 1);
        }
        self.park(base);
        Ok(())
    }

    fn add_root(&mut self, base: &Path, count: usize) -> Result<(), WatcherError> {
        if refuses_watch(base) {
            return Err(WatcherError::file_watch(format!("failed to watch {}", base.display()))
                .with_path(base));
        }
        self.watcher
            .watch(base, RecursiveMode::Recursive)
            .map_err(|e| {
                WatcherError::file_watch(format!("failed to watch {}", base.display()))
                    .with_path(base)
                    .with_source(e)
            })?;
        info!("Watching {} for changes", base.display());
        *self.roots.entry(base.to_path_buf()).or_insert(0) += count;
        Ok(())
    }

    fn release_root(&mut self, base: &Path) {
        let waiting = match self.pending.write() {
            Ok(mut pending) => match pending.get(base).copied() {
                Some(count) if count > 1 => {
                    pending.insert(base.to_path_buf(), count - 1);
                    return;
                }
                Some(_) => {
                    pending.remove(base);
                    true
                }
                None => false,
            },
            Err(_) => false,
        };
        if waiting {
            self.unpark(base);
            return;
        }

        let Some(count) = self.roots.get_mut(base) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }

        self.roots.remove(base);
        if let Err(e) = self.watcher.unwatch(base) {
            debug!("Failed to unwatch {}: {}", base.display(), e);
        }
        if self.parked.contains_key(base) && !self.is_covered(base) {
            if let Err(e) = self.watcher.watch(base, RecursiveMode::NonRecursive) {
                debug!("Failed to re-park on {}: {}", base.display(), e);
            }
        }
    }

    /// Watches the nearest existing ancestor of a missing base.
    fn park(&mut self, base: &Path) {
        let Some(dir) = base.ancestors().skip(1).find(|a| a.is_dir()) else {
            debug!("No existing ancestor to wait on for {}", base.display());
            return;
        };
        let dir = dir.to_path_buf();
        self.parked_on.insert(base.to_path_buf(), dir.clone());

        let count = self.parked.entry(dir.clone()).or_insert(0);
        *count += 1;
        if *count > 1 || self.is_covered(&dir) {
            return;
        }
        match self.watcher.watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => debug!("Waiting on {} for {}", dir.display(), base.display()),
            Err(e) => debug!("Failed to wait on {}: {}", dir.display(), e),
        }
    }

    fn unpark(&mut self, base: &Path) {
        let Some(dir) = self.parked_on.remove(base) else {
            return;
        };
        let Some(count) = self.parked.get_mut(&dir) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }

        self.parked.remove(&dir);
        if !self.is_covered(&dir) {
            if let Err(e) = self.watcher.unwatch(&dir) {
                debug!("Failed to stop waiting on {}: {}", dir.display(), e);
            }
        }
    }

    /// Whether a recursive root already delivers events for `dir`.
    fn is_covered(&self, dir: &Path) -> bool {
        self.roots.keys().any(|root| dir.starts_with(root))
    }
}

#[cfg(not(test))]
fn refuses_watch(_base: &Path) -> bool {
    false
}

/// Directories named like this fail to watch under test, standing in for
/// a native watch the OS rejects.
#[cfg(test)]
pub(crate) const UNWATCHABLE: &str = "unwatchable";

#[cfg(test)]
fn refuses_watch(base: &Path) -> bool {
    base.ends_with(UNWATCHABLE)
}

/// Whether `path` is a pending base or one of its missing ancestors.
fn leads_to_pending(pending: &Pending, path: &Path) -> bool {
    pending
        .read()
        .map(|bases| bases.keys().any(|base| base.starts_with(path)))
        .unwrap_or(false)
}

pub(crate) fn is_watched(subscriptions: &Subscriptions, path: &Path) -> bool {
    subscriptions
        .read()
        .map(|groups| groups.values().any(|patterns| patterns.matches(path)))
        .unwrap_or(false)
}

/// Maps a notify event to the add/change/unlink vocabulary.
///
/// Access and metadata-only events carry no content change and are dropped.
fn classify(event: &Event) -> Vec<(FileEvent, PathBuf)> {
    let all = |kind: FileEvent| -> Vec<(FileEvent, PathBuf)> {
        event.paths.iter().map(|p| (kind, p.clone())).collect()
    };

    match &event.kind {
        EventKind::Create(_) => all(FileEvent::Add),
        EventKind::Remove(_) => all(FileEvent::Unlink),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(FileEvent::Unlink),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(FileEvent::Add),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => vec![
            (FileEvent::Unlink, event.paths[0].clone()),
            (FileEvent::Add, event.paths[1].clone()),
        ],
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    FileEvent::Add
                } else {
                    FileEvent::Unlink
                };
                (kind, p.clone())
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => all(FileEvent::Change),
        _ => Vec::new(),
    }
}
