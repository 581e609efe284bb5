//! Expiry sweeper - reclaims expired tasks and their files

use crate::artifact::discard_artifact;
use crate::registry::TaskRegistry;
use crate::task::TaskId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records deleted
    pub removed: Vec<TaskId>,

    /// Files that existed and were deleted
    pub files_removed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Periodically deletes tasks whose expiry has passed
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    registry: Arc<TaskRegistry>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(registry: Arc<TaskRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Delete every record expired at `now` along with its files
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for id in self.registry.expired_ids(now) {
            // Re-checked under the write lock; the expiry may have moved
            let Some(record) = self.registry.delete_if_expired(&id, now) else {
                continue;
            };

            for path in [&record.source_path, &record.output_path] {
                if discard_artifact(path).await {
                    report.files_removed += 1;
                }
            }
            debug!(task_id = %id, status = %record.status, "Expired task removed");
            report.removed.push(id);
        }

        report
    }

    /// Sweep every interval until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Expiry sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.sweep_once(Utc::now()).await;
                    if !report.is_empty() {
                        info!(
                            removed = report.removed.len(),
                            files = report.files_removed,
                            remaining = self.registry.len(),
                            "Expired tasks swept"
                        );
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TaskStatus;
    use crate::task::{NewTask, TaskOptions, TaskRecord};
    use tempfile::TempDir;

    fn record(dir: &TempDir, name: &str) -> TaskRecord {
        TaskRecord::new(
            NewTask {
                filename: format!("{}.pdf", name),
                source_path: dir.path().join(format!("{}-src", name)),
                options: TaskOptions::default(),
            },
            dir.path().join(format!("{}-out", name)),
            Duration::from_secs(600),
        )
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(TaskRegistry::new());

        let fresh = TaskId::from("fresh");
        let stale = TaskId::from("stale");
        registry.create(fresh.clone(), record(&dir, "fresh")).unwrap();
        registry.create(stale.clone(), record(&dir, "stale")).unwrap();
        registry
            .extend_expiry(&stale, Utc::now() - chrono::Duration::seconds(5))
            .unwrap();

        let stale_record = registry.get(&stale).unwrap();
        std::fs::write(&stale_record.source_path, b"src").unwrap();
        std::fs::write(&stale_record.output_path, b"out").unwrap();
        let fresh_record = registry.get(&fresh).unwrap();
        std::fs::write(&fresh_record.source_path, b"src").unwrap();

        let sweeper = ExpirySweeper::new(Arc::clone(&registry), Duration::from_secs(60));
        let report = sweeper.sweep_once(Utc::now()).await;

        assert_eq!(report.removed, vec![stale]);
        assert_eq!(report.files_removed, 2);
        assert!(!stale_record.source_path.exists());
        assert!(!stale_record.output_path.exists());
        assert!(fresh_record.source_path.exists());
        assert_eq!(registry.status(&fresh).unwrap(), TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweep_tolerates_missing_files() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(TaskRegistry::new());
        let id = TaskId::generate();
        registry.create(id.clone(), record(&dir, "gone")).unwrap();

        let sweeper = ExpirySweeper::new(Arc::clone(&registry), Duration::from_secs(60));
        let later = Utc::now() + chrono::Duration::hours(1);
        let report = sweeper.sweep_once(later).await;

        assert_eq!(report.removed, vec![id]);
        assert_eq!(report.files_removed, 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let registry = Arc::new(TaskRegistry::new());
        let shutdown = CancellationToken::new();
        let handle = ExpirySweeper::new(registry, Duration::from_millis(10)).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
