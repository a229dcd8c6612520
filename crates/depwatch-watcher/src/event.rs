//! Change notifications and the callback contract.

use crate::impact::ImpactAnalysisResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depwatch_core::WatcherError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// Kind of file-system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEvent {
    Add,
    Change,
    Unlink,
}

impl std::fmt::Display for FileEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Unlink => "unlink",
        };
        write!(f, "{}", s)
    }
}

/// What happened, to which file, and when.
///
/// After debouncing, `timestamp` is the time of the last event in the burst.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChangeInfo {
    pub file_path: PathBuf,
    pub event: FileEvent,
    pub timestamp: DateTime<Utc>,
}

/// Handler a watch group registers to react to changes.
///
/// Any `Fn(FileChangeInfo, ImpactAnalysisResult) -> impl Future<Output = anyhow::Result<()>>`
/// closure works. An `Err` or a panic is reported to the error sink and
/// never stops other groups from being notified.
#[async_trait]
pub trait ChangeCallback: Send + Sync {
    async fn on_change(
        &self,
        info: &FileChangeInfo,
        impact: &ImpactAnalysisResult,
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> ChangeCallback for F
where
    F: Fn(FileChangeInfo, ImpactAnalysisResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_change(
        &self,
        info: &FileChangeInfo,
        impact: &ImpactAnalysisResult,
    ) -> anyhow::Result<()> {
        (self)(info.clone(), impact.clone()).await
    }
}

/// Process-wide error handler. Only the most recently registered one is kept.
pub type ErrorSink = Arc<dyn Fn(&WatcherError) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&FileEvent::Unlink).unwrap(), "\"unlink\"");
        assert_eq!(FileEvent::Change.to_string(), "change");
    }

    #[tokio::test]
    async fn test_closure_is_a_callback() {
        let callback = |info: FileChangeInfo, impact: ImpactAnalysisResult| async move {
            anyhow::ensure!(info.file_path == impact.changed_file, "mismatched paths");
            Ok::<(), anyhow::Error>(())
        };

        let info = FileChangeInfo {
            file_path: PathBuf::from("/src/a.ts"),
            event: FileEvent::Change,
            timestamp: Utc::now(),
        };
        let impact = ImpactAnalysisResult {
            changed_file: PathBuf::from("/src/a.ts"),
            affected_files: vec![PathBuf::from("/src/a.ts")],
            affected_groups: vec!["g".into()],
        };

        assert!(callback.on_change(&info, &impact).await.is_ok());
    }
}
