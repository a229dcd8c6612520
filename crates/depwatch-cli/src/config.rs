//! Project configuration (`depwatch.json`).

use depwatch_watcher::WatcherConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_FILE: &str = "depwatch.json";

/// One watch group as written in the config file or on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    pub patterns: Vec<String>,

    /// Shell command run whenever the group is affected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Parses `id=pattern,pattern`.
impl FromStr for GroupConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, patterns) = s
            .split_once('=')
            .ok_or_else(|| format!("expected ID=PATTERN[,PATTERN...], got '{}'", s))?;

        let id = id.trim();
        if id.is_empty() {
            return Err("group id must not be empty".to_string());
        }

        let patterns: Vec<String> = patterns
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        if patterns.is_empty() {
            return Err(format!("group '{}' needs at least one pattern", id));
        }

        Ok(Self {
            id: id.to_string(),
            patterns,
            command: None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub watcher: WatcherConfig,
    pub groups: Vec<GroupConfig>,
}

impl ProjectConfig {
    /// Reads a config file. Relative roots are taken relative to the
    /// file's directory, and a missing root defaults to that directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: ProjectConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.watcher.root = Some(match config.watcher.root.take() {
            Some(root) if root.is_relative() => dir.join(root),
            Some(root) => root,
            None => dir,
        });

        Ok(config)
    }

    /// Starter config written by `depwatch init`.
    pub fn starter() -> Self {
        Self {
            watcher: WatcherConfig::default(),
            groups: vec![GroupConfig {
                id: "src".to_string(),
                patterns: vec![
                    "src/**/*.ts".to_string(),
                    "src/**/*.tsx".to_string(),
                    "!src/**/*.test.ts".to_string(),
                ],
                command: None,
            }],
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_group_arg() {
        let group: GroupConfig = "api=src/api/**/*.ts, src/shared/*.ts".parse().unwrap();
        assert_eq!(group.id, "api");
        assert_eq!(group.patterns, vec!["src/api/**/*.ts", "src/shared/*.ts"]);
        assert!(group.command.is_none());
    }

    #[test]
    fn test_parse_group_arg_rejects_malformed() {
        assert!("no-equals-sign".parse::<GroupConfig>().is_err());
        assert!("=src/*.ts".parse::<GroupConfig>().is_err());
        assert!("api=".parse::<GroupConfig>().is_err());
        assert!("api= , ".parse::<GroupConfig>().is_err());
    }

    #[test]
    fn test_load_fills_defaults_and_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{
                "watcher": { "debounce_ms": 50 },
                "groups": [
                    { "id": "web", "patterns": ["web/**/*.tsx"], "command": "npm test" }
                ]
            }"#,
        )
        .unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.watcher.debounce_ms, 50);
        assert_eq!(config.watcher.max_cache_size, 1000);
        assert_eq!(config.watcher.root.as_deref(), Some(dir.path()));
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.groups[0].command.as_deref(), Some("npm test"));
    }

    #[test]
    fn test_load_resolves_relative_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{ "watcher": { "root": "packages/app" } }"#).unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.watcher.root, Some(dir.path().join("packages/app")));
        assert!(config.groups.is_empty());
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();

        let err = ProjectConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }

    #[test]
    fn test_starter_round_trips() {
        let starter = ProjectConfig::starter();
        let parsed: ProjectConfig = serde_json::from_str(&starter.to_json().unwrap()).unwrap();
        assert_eq!(parsed, starter);
    }
}
