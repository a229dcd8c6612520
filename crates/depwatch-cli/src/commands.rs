//! CLI command implementations.

use crate::config::{GroupConfig, ProjectConfig, CONFIG_FILE};
use colored::Colorize;
use depwatch_core::TypeScriptExtractor;
use depwatch_graph::DependencyGraph;
use depwatch_watcher::{
    shutdown_signal, DependencyWatcher, FileChangeInfo, ImpactAnalysisResult, PatternSet,
    WatcherConfig, WatcherError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Write a starter config into a directory.
pub fn init(path: &Path) -> Result<()> {
    let config_path = path.join(CONFIG_FILE);

    if config_path.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    fs::create_dir_all(path)?;
    fs::write(&config_path, ProjectConfig::starter().to_json()?)?;

    println!("{} Created {}", "✓".green(), config_path.display());
    println!("  Edit the groups, then run {}", "depwatch watch".cyan());

    Ok(())
}

/// Watch every configured group until Ctrl+C.
pub async fn watch(config_path: &Path, extra_groups: Vec<GroupConfig>, json: bool) -> Result<()> {
    let mut config = if config_path.exists() {
        ProjectConfig::load(config_path)?
    } else if extra_groups.is_empty() {
        return Err(format!(
            "no config at {} and no --group given (run {} first)",
            config_path.display(),
            "depwatch init".cyan()
        )
        .into());
    } else {
        ProjectConfig::default()
    };
    config.groups.extend(extra_groups);

    let root = config.watcher.root_dir();
    info!(
        "Watching {} with {} groups (debounce {}ms)",
        root.display(),
        config.groups.len(),
        config.watcher.debounce_ms
    );
    let watcher = DependencyWatcher::new(config.watcher.clone());
    watcher.on_error(print_error);
    watcher.initialize().await?;

    let spinner = spinner(json, "Resolving watch groups...")?;
    for group in &config.groups {
        spinner.set_message(format!("Resolving {}...", group.id));
        register_group(&watcher, group, &root, json).await?;
    }
    spinner.finish_and_clear();

    let status = watcher.get_watch_status().await;
    if !json {
        println!(
            "{} Watching {} files in {} groups ({} graph nodes)",
            "✓".green(),
            status.file_count.to_string().cyan(),
            status.group_count.to_string().cyan(),
            status.dependency_node_count
        );
        println!("  Press {} to stop", "Ctrl+C".cyan());
    }

    shutdown_signal().await;
    info!("Shutdown requested");
    watcher.stop();

    if !json {
        println!("{} Stopped", "✓".green());
    }
    Ok(())
}

async fn register_group(
    watcher: &DependencyWatcher,
    group: &GroupConfig,
    root: &Path,
    json: bool,
) -> Result<()> {
    let id = group.id.clone();
    let command = group.command.clone();
    let root = root.to_path_buf();

    watcher
        .add_watch_group(
            group.id.clone(),
            group.patterns.clone(),
            move |info: FileChangeInfo, impact: ImpactAnalysisResult| {
                let id = id.clone();
                let command = command.clone();
                let root = root.clone();
                async move {
                    print_change(&id, &info, &impact, &root, json)?;
                    if let Some(command) = command {
                        run_hook(&command, &id, &info).await?;
                    }
                    Ok::<(), anyhow::Error>(())
                }
            },
        )
        .await?;
    Ok(())
}

fn print_change(
    group: &str,
    info: &FileChangeInfo,
    impact: &ImpactAnalysisResult,
    root: &Path,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let output = serde_json::json!({
            "group": group,
            "event": info.event,
            "file": info.file_path,
            "timestamp": info.timestamp,
            "affected_files": impact.affected_files,
            "affected_groups": impact.affected_groups,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!(
        "{} {} {} {}",
        "●".cyan(),
        group.bold(),
        info.event.to_string().yellow(),
        relative(root, &info.file_path)
    );
    for dependent in impact.dependents() {
        println!("    {} {}", "↳".dimmed(), relative(root, dependent).dimmed());
    }
    Ok(())
}

/// Runs a group's shell command. A non-zero exit fails the callback.
async fn run_hook(command: &str, group: &str, info: &FileChangeInfo) -> anyhow::Result<()> {
    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };

    debug!("Running hook for group '{}': {}", group, command);
    let status = cmd
        .env("DEPWATCH_GROUP", group)
        .env("DEPWATCH_EVENT", info.event.to_string())
        .env("DEPWATCH_FILE", &info.file_path)
        .status()
        .await
        .map_err(|e| anyhow::anyhow!("failed to run `{}`: {}", command, e))?;

    if !status.success() {
        warn!("Hook for group '{}' exited with {}", group, status);
        anyhow::bail!("`{}` exited with {}", command, status);
    }
    Ok(())
}

fn print_error(err: &WatcherError) {
    match err.file_path() {
        Some(path) => eprintln!("{} {} ({})", "✗".red(), err, path.display()),
        None => eprintln!("{} {}", "✗".red(), err),
    }
}

/// Build the dependency graph for some patterns and print it.
pub async fn graph(patterns: &[String], json: bool) -> Result<()> {
    let root = WatcherConfig::default().root_dir();
    let matcher = PatternSet::compile(&root, patterns)?;

    let spinner = spinner(json, "Building dependency graph...")?;
    let files: Vec<PathBuf> = tokio::task::spawn_blocking(move || matcher.resolve(true))
        .await?
        .into_iter()
        .collect();
    debug!("{} files match {:?}", files.len(), patterns);

    let mut graph = DependencyGraph::new(Arc::new(TypeScriptExtractor::new()));
    graph.build_graph(&files).await?;
    spinner.finish_and_clear();

    let mut nodes: Vec<_> = graph.nodes().collect();
    nodes.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    let stats = graph.stats();
    let cycles = graph.find_circular_dependencies();

    if json {
        let output = serde_json::json!({
            "stats": stats,
            "nodes": nodes,
            "cycles": cycles,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for node in &nodes {
        println!("{}", relative(&root, &node.file_path).cyan());
        for dependency in &node.dependencies {
            println!("    {} {}", "→".dimmed(), relative(&root, dependency));
        }
    }

    println!();
    println!(
        "{} {} files, {} imports",
        "✓".green(),
        stats.node_count.to_string().cyan(),
        stats.edge_count.to_string().cyan()
    );

    if !cycles.is_empty() {
        println!(
            "\n{} {} circular dependencies:",
            "⚠".yellow(),
            cycles.len()
        );
        for cycle in &cycles {
            let chain: Vec<String> = cycle.iter().map(|p| relative(&root, p)).collect();
            println!("  {}", chain.join(" → "));
        }
    }

    Ok(())
}

/// Show what a change to one file would affect.
pub async fn impact(file: &Path, patterns: &[String], json: bool) -> Result<()> {
    let config = WatcherConfig::default();
    let root = config.root_dir();
    let watcher = DependencyWatcher::new(config);

    let spinner = spinner(json, "Building dependency graph...")?;
    watcher
        .add_watch_group(
            "patterns",
            patterns.iter().cloned(),
            |_: FileChangeInfo, _: ImpactAnalysisResult| async { Ok::<(), anyhow::Error>(()) },
        )
        .await?;
    let analysis = watcher.calculate_impact(file).await;
    watcher.stop();
    spinner.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let dependents = analysis.dependents();
    if dependents.is_empty() {
        println!(
            "{} Nothing depends on {}",
            "✓".green(),
            relative(&root, &analysis.changed_file).cyan()
        );
        return Ok(());
    }

    println!(
        "Changing {} affects {} files:",
        relative(&root, &analysis.changed_file).cyan(),
        dependents.len().to_string().yellow()
    );
    for dependent in dependents {
        println!("  {} {}", "•".yellow(), relative(&root, dependent));
    }

    Ok(())
}

fn spinner(hidden: bool, message: &'static str) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message);
    Ok(spinner)
}

/// Path relative to the project root when possible, for display.
fn relative(root: &Path, path: &Path) -> String {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    path.strip_prefix(&root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_starter_config_once() {
        let dir = tempdir().unwrap();

        init(dir.path()).unwrap();
        let config = ProjectConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.groups, ProjectConfig::starter().groups);

        // A second run leaves the edited file alone
        fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();
        init(dir.path()).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap(),
            "{}"
        );
    }

    #[test]
    fn test_relative_strips_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let inside = root.join("src").join("a.ts");

        assert_eq!(relative(&root, &inside), Path::new("src").join("a.ts").display().to_string());
        assert_eq!(relative(&root, Path::new("/elsewhere/b.ts")), "/elsewhere/b.ts");
    }

    #[tokio::test]
    async fn test_hook_exit_status_is_reported() {
        if cfg!(windows) {
            return;
        }
        let info = FileChangeInfo {
            file_path: PathBuf::from("/src/a.ts"),
            event: depwatch_watcher::FileEvent::Change,
            timestamp: chrono::Utc::now(),
        };

        run_hook("test \"$DEPWATCH_GROUP\" = api", "api", &info)
            .await
            .unwrap();
        run_hook("test \"$DEPWATCH_EVENT:$DEPWATCH_FILE\" = change:/src/a.ts", "api", &info)
            .await
            .unwrap();

        let err = run_hook("exit 3", "api", &info).await.unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_hook_is_logged() {
        if cfg!(windows) {
            return;
        }
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let info = FileChangeInfo {
            file_path: PathBuf::from("/src/a.ts"),
            event: depwatch_watcher::FileEvent::Add,
            timestamp: chrono::Utc::now(),
        };
        run_hook("exit 2", "web", &info).await.unwrap_err();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Running hook for group 'web': exit 2"));
        assert!(output.contains("Hook for group 'web' exited with"));
    }
}
