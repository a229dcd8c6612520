//! The dependency watcher.
//!
//! Wires pattern resolution, the dependency graph, the native event
//! source, debouncing and impact analysis together. One watcher owns its
//! graph, groups and cache; there is no global instance.
//!
//! Event flow: native event -> debounce per `event:path` -> graph update
//! -> cache invalidation -> impact analysis -> one callback per affected
//! group, in order, each failure isolated.

use crate::config::WatcherConfig;
use crate::debounce::Debouncer;
use crate::event::{ChangeCallback, ErrorSink, FileChangeInfo, FileEvent};
use crate::group::{canonical_path, PatternSet, WatchGroup, WatchGroupRegistry};
use crate::impact::{analyze, ImpactAnalysisResult};
use crate::signals;
use crate::source::{EventSource, SourceEvent};
use chrono::Utc;
use depwatch_core::{ImportExtractor, TypeScriptExtractor, WatcherError};
use depwatch_graph::{CacheStats, DependencyGraph, GraphStats, ImpactCache};
use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Read-only snapshot of the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchStatus {
    pub is_watching: bool,
    pub group_count: usize,
    /// Sum over groups; a file shared by two groups counts twice.
    pub file_count: usize,
    pub dependency_node_count: usize,
}

/// Watches groups of files and tells each group when something it
/// depends on changes.
///
/// Cloning is cheap and every clone drives the same watcher.
#[derive(Clone)]
pub struct DependencyWatcher {
    inner: Arc<Inner>,
}

struct Inner {
    config: WatcherConfig,
    root: PathBuf,
    state: tokio::sync::Mutex<State>,
    lifecycle: Mutex<Lifecycle>,
    debouncer: Debouncer,
    error_sink: Mutex<Option<ErrorSink>>,
}

struct State {
    graph: DependencyGraph,
    groups: WatchGroupRegistry,
    callbacks: HashMap<String, Arc<dyn ChangeCallback>>,
    cache: ImpactCache,
}

#[derive(Default)]
struct Lifecycle {
    source: Option<EventSource>,
    pump: Option<JoinHandle<()>>,
    signals: Option<JoinHandle<()>>,
}

impl DependencyWatcher {
    /// Creates a watcher using the built-in TypeScript/JavaScript extractor.
    pub fn new(config: WatcherConfig) -> Self {
        Self::with_extractor(config, Arc::new(TypeScriptExtractor::new()))
    }

    /// Creates a watcher backed by a custom import extractor.
    pub fn with_extractor(config: WatcherConfig, extractor: Arc<dyn ImportExtractor>) -> Self {
        let root = config.root_dir();
        let root = canonical_path(&root, &root);
        let state = State {
            graph: DependencyGraph::new(extractor),
            groups: WatchGroupRegistry::default(),
            callbacks: HashMap::new(),
            cache: ImpactCache::new(config.max_cache_size),
        };

        Self {
            inner: Arc::new(Inner {
                debouncer: Debouncer::new(config.debounce_time()),
                config,
                root,
                state: tokio::sync::Mutex::new(state),
                lifecycle: Mutex::new(Lifecycle::default()),
                error_sink: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.inner.config
    }

    /// Starts the native event source. Calling it again is a no-op.
    ///
    /// After `stop()` this resumes watching every group still registered.
    pub async fn initialize(&self) -> Result<(), WatcherError> {
        if self.inner.lifecycle().source.is_some() {
            debug!("Dependency watcher already initialized");
            return Ok(());
        }

        let state = self.inner.state.lock().await;
        {
            let mut lifecycle = self.inner.lifecycle();
            if lifecycle.source.is_some() {
                return Ok(());
            }

            // Nothing is committed until every group is subscribed again
            let (tx, rx) = mpsc::unbounded_channel();
            let mut source = EventSource::new(tx)?;
            for group in state.groups.iter() {
                source.subscribe(&group.id, &group.matcher)?;
            }
            lifecycle.source = Some(source);
            lifecycle.pump = Some(spawn_pump(Arc::downgrade(&self.inner), rx));
        }

        info!(
            "Dependency watcher initialized ({} groups)",
            state.groups.len()
        );
        Ok(())
    }

    /// Registers a watch group and rebuilds the graph over all groups.
    ///
    /// Fails with `INVALID_WATCH_GROUP` for an empty id, an empty or
    /// malformed pattern list, or an id that is already registered.
    pub async fn add_watch_group<I, S, C>(
        &self,
        group_id: impl Into<String>,
        patterns: I,
        callback: C,
    ) -> Result<(), WatcherError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        C: ChangeCallback + 'static,
    {
        let group_id = group_id.into();
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();

        if group_id.trim().is_empty() {
            return Err(WatcherError::invalid_watch_group(
                "watch group id must not be empty",
            ));
        }
        if patterns.is_empty() {
            return Err(WatcherError::invalid_watch_group(format!(
                "watch group '{}' needs at least one pattern",
                group_id
            )));
        }

        self.initialize().await?;

        let matcher = PatternSet::compile(&self.inner.root, &patterns)?;
        let mut state = self.inner.state.lock().await;

        if state.groups.contains(&group_id) {
            return Err(WatcherError::invalid_watch_group(format!(
                "watch group '{}' already exists",
                group_id
            )));
        }

        let files = resolve_files(matcher.clone(), self.inner.config.respect_gitignore).await?;
        info!(
            "Watch group '{}': {} files from {} patterns",
            group_id,
            files.len(),
            patterns.len()
        );

        self.inner.subscribe(&group_id, &matcher)?;
        state
            .groups
            .insert(WatchGroup::new(group_id.clone(), matcher, files));
        state.callbacks.insert(group_id.clone(), Arc::new(callback));

        if let Err(e) = self.inner.rebuild(&mut state).await {
            warn!("Watch group '{}' not registered: {}", group_id, e);
            state.groups.remove(&group_id);
            state.callbacks.remove(&group_id);
            self.inner.unsubscribe(&group_id);
            return Err(e);
        }
        Ok(())
    }

    /// Unregisters a group. Unknown ids are ignored.
    ///
    /// The graph is rebuilt from the surviving groups so files they share
    /// with the removed group keep their edges.
    pub async fn remove_watch_group(&self, group_id: &str) -> Result<(), WatcherError> {
        let mut state = self.inner.state.lock().await;

        let Some(group) = state.groups.remove(group_id) else {
            debug!("No watch group '{}' to remove", group_id);
            return Ok(());
        };

        self.inner.unsubscribe(group_id);
        state.callbacks.remove(group_id);
        state.cache.clear();
        info!(
            "Removed watch group '{}' ({} files)",
            group_id,
            group.files.len()
        );

        self.inner.rebuild(&mut state).await
    }

    /// Re-resolves every group's patterns and rebuilds the graph.
    pub async fn update_dependency_graph(&self) -> Result<(), WatcherError> {
        let mut state = self.inner.state.lock().await;
        self.inner.refresh_and_rebuild(&mut state).await
    }

    /// Works out which files and groups a change to `file` affects.
    pub async fn calculate_impact(&self, file: impl AsRef<Path>) -> ImpactAnalysisResult {
        let path = canonical_path(&self.inner.root, file.as_ref());
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        analyze(&state.graph, &mut state.cache, &state.groups, &path)
    }

    pub async fn get_watch_status(&self) -> WatchStatus {
        let is_watching = self.inner.lifecycle().source.is_some();
        let state = self.inner.state.lock().await;
        WatchStatus {
            is_watching,
            group_count: state.groups.len(),
            file_count: state.groups.file_count(),
            dependency_node_count: state.graph.node_count(),
        }
    }

    pub async fn graph_stats(&self) -> GraphStats {
        self.inner.state.lock().await.graph.stats()
    }

    pub async fn circular_dependencies(&self) -> Vec<Vec<PathBuf>> {
        self.inner
            .state
            .lock()
            .await
            .graph
            .find_circular_dependencies()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.inner.state.lock().await.cache.stats()
    }

    /// Sets the error sink, replacing any previous one.
    pub fn on_error<F>(&self, sink: F)
    where
        F: Fn(&WatcherError) + Send + Sync + 'static,
    {
        *lock(&self.inner.error_sink) = Some(Arc::new(sink));
    }

    /// Feeds an event into the debounce layer, as the native source does.
    ///
    /// Ignored while the watcher is not initialized.
    pub fn notify(&self, event: FileEvent, path: impl Into<PathBuf>) {
        if self.inner.lifecycle().source.is_none() {
            debug!("Watcher not initialized, ignoring {} event", event);
            return;
        }
        self.inner.schedule(event, path.into());
    }

    /// Stops and exits the process on SIGINT/SIGTERM.
    ///
    /// Opt-in, so several watchers in one process don't fight over
    /// signals. Calling it twice keeps a single listener; `stop()`
    /// removes it.
    pub fn install_signal_handlers(&self) {
        let mut lifecycle = self.inner.lifecycle();
        if lifecycle.signals.is_some() {
            return;
        }

        let inner = Arc::downgrade(&self.inner);
        lifecycle.signals = Some(signals::spawn_listener(move || {
            if let Some(inner) = inner.upgrade() {
                inner.stop();
            }
            std::process::exit(0);
        }));
        debug!("Installed signal handlers");
    }

    /// Closes the event source and drops every pending notification.
    ///
    /// Callbacks already running are left to finish. The watcher can be
    /// initialized again afterwards.
    pub fn stop(&self) {
        self.inner.stop();
    }
}

impl Inner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }

    fn subscribe(&self, group_id: &str, matcher: &PatternSet) -> Result<(), WatcherError> {
        match self.lifecycle().source.as_mut() {
            Some(source) => source.subscribe(group_id, matcher),
            None => Ok(()),
        }
    }

    fn unsubscribe(&self, group_id: &str) {
        if let Some(source) = self.lifecycle().source.as_mut() {
            source.unsubscribe(group_id);
        }
    }

    /// Starts watching pattern bases that have just been created and
    /// reports the matching files already inside them as added.
    async fn pick_up_new_bases(self: &Arc<Self>) {
        let (appeared, subscriptions) = {
            let mut lifecycle = self.lifecycle();
            let Some(source) = lifecycle.source.as_mut() else {
                return;
            };
            (source.retry_pending(), source.subscriptions())
        };
        if appeared.is_empty() {
            return;
        }
        for base in &appeared {
            info!("{} appeared, watching it for changes", base.display());
        }

        let matchers: Vec<PatternSet> = subscriptions
            .read()
            .map(|groups| groups.values().cloned().collect())
            .unwrap_or_default();
        let respect_gitignore = self.config.respect_gitignore;

        let found = tokio::task::spawn_blocking(move || {
            matchers
                .iter()
                .flat_map(|matcher| matcher.resolve(respect_gitignore))
                .filter(|file| appeared.iter().any(|base| file.starts_with(base)))
                .collect::<BTreeSet<_>>()
        })
        .await;

        match found {
            Ok(files) => {
                for file in files {
                    self.schedule(FileEvent::Add, file);
                }
            }
            Err(e) => self.report(
                WatcherError::file_watch("scanning new directories did not complete").with_source(e),
            ),
        }
    }

    fn schedule(self: &Arc<Self>, event: FileEvent, path: PathBuf) {
        let key = format!("{}:{}", event, path.display());
        let info = FileChangeInfo {
            file_path: path,
            event,
            timestamp: Utc::now(),
        };

        let inner = Arc::downgrade(self);
        self.debouncer.schedule(key, async move {
            if let Some(inner) = inner.upgrade() {
                inner.process(info).await;
            }
        });
    }

    async fn refresh_and_rebuild(&self, state: &mut State) -> Result<(), WatcherError> {
        let respect_gitignore = self.config.respect_gitignore;
        let matchers: Vec<(String, PatternSet)> = state
            .groups
            .iter()
            .map(|g| (g.id.clone(), g.matcher.clone()))
            .collect();

        let resolved = tokio::task::spawn_blocking(move || {
            matchers
                .into_iter()
                .map(|(id, matcher)| (id, matcher.resolve(respect_gitignore)))
                .collect::<HashMap<_, _>>()
        })
        .await
        .map_err(|e| WatcherError::file_watch("pattern resolution did not complete").with_source(e))?;

        for group in state.groups.iter_mut() {
            if let Some(files) = resolved.get(&group.id) {
                group.files = files.clone();
            }
        }

        self.rebuild(state).await
    }

    /// Rebuilds the graph over the union of all groups' files.
    async fn rebuild(&self, state: &mut State) -> Result<(), WatcherError> {
        let files = state.groups.all_files();
        let result = state.graph.build_graph(&files).await;
        state.cache.clear();
        result?;

        if self.config.detect_circular {
            let cycles = state.graph.find_circular_dependencies();
            if !cycles.is_empty() {
                warn!("Found {} circular dependencies", cycles.len());
                for cycle in &cycles {
                    let chain: Vec<String> = cycle.iter().map(|p| p.display().to_string()).collect();
                    warn!("  {}", chain.join(" -> "));
                }
            }
        }

        Ok(())
    }

    /// Handles one debounced event end to end.
    async fn process(&self, mut info: FileChangeInfo) {
        let path = canonical_path(&self.root, &info.file_path);
        info.file_path = path.clone();

        let (impact, callbacks) = {
            let mut guard = self.state.lock().await;

            match info.event {
                FileEvent::Unlink => {
                    guard.graph.remove_node(&path);
                }
                FileEvent::Add => {
                    guard.graph.add_node(path.clone());
                    let enrolled = guard.groups.enroll(&path);
                    if !enrolled.is_empty() {
                        debug!("{} joined groups {:?}", path.display(), enrolled);
                    }
                }
                FileEvent::Change => {
                    guard.graph.add_node(path.clone());
                    if let Err(e) = self.refresh_and_rebuild(&mut guard).await {
                        self.report(e);
                    }
                }
            }

            guard.cache.clear();

            let state = &mut *guard;
            let impact = analyze(&state.graph, &mut state.cache, &state.groups, &path);
            let callbacks: Vec<(String, Arc<dyn ChangeCallback>)> = impact
                .affected_groups
                .iter()
                .filter_map(|id| {
                    state
                        .callbacks
                        .get(id)
                        .map(|callback| (id.clone(), Arc::clone(callback)))
                })
                .collect();
            (impact, callbacks)
        };

        if callbacks.is_empty() {
            debug!(
                "No watch groups affected by {} of {}",
                info.event,
                path.display()
            );
            return;
        }

        info!(
            "{} {}: {} files affected across {} groups",
            info.event,
            path.display(),
            impact.affected_files.len(),
            callbacks.len()
        );

        for (group_id, callback) in callbacks {
            let outcome = AssertUnwindSafe(callback.on_change(&info, &impact))
                .catch_unwind()
                .await;

            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => WatcherError::dependency_analysis(format!(
                    "change callback for group '{}' failed: {}",
                    group_id, e
                ))
                .with_source(e),
                Err(panic) => WatcherError::dependency_analysis(format!(
                    "change callback for group '{}' panicked: {}",
                    group_id,
                    panic_message(panic.as_ref())
                )),
            };

            self.report(failure.with_path(path.clone()));
        }
    }

    /// Logs an error and hands it to the registered sink.
    fn report(&self, err: WatcherError) {
        error!(
            code = %err.code(),
            path = ?err.file_path(),
            "{}",
            err.message()
        );

        let sink = lock(&self.error_sink).clone();
        if let Some(sink) = sink {
            sink(&err);
        }
    }

    fn stop(&self) {
        let was_watching = {
            let mut lifecycle = self.lifecycle();
            if let Some(pump) = lifecycle.pump.take() {
                pump.abort();
            }
            if let Some(signals) = lifecycle.signals.take() {
                signals.abort();
            }
            lifecycle.source.take().is_some()
        };

        let dropped = self.debouncer.cancel_all();
        if was_watching {
            info!(
                "Dependency watcher stopped ({} pending notifications dropped)",
                dropped
            );
        }
    }
}

/// Forwards native events into the debounce layer until the source closes.
fn spawn_pump(inner: Weak<Inner>, mut rx: UnboundedReceiver<SourceEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            match event {
                SourceEvent::Fs { event, path } => inner.schedule(event, path),
                SourceEvent::BaseAppeared => inner.pick_up_new_bases().await,
                SourceEvent::Error(e) => {
                    let err = WatcherError::file_watch(format!("file watcher error: {}", e));
                    let err = match e.paths.first() {
                        Some(path) => err.with_path(path.clone()),
                        None => err,
                    };
                    inner.report(err.with_source(e));
                }
            }
        }
    })
}

async fn resolve_files(
    matcher: PatternSet,
    respect_gitignore: bool,
) -> Result<BTreeSet<PathBuf>, WatcherError> {
    tokio::task::spawn_blocking(move || matcher.resolve(respect_gitignore))
        .await
        .map_err(|e| WatcherError::file_watch("pattern resolution did not complete").with_source(e))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
