//! Task definition and types

use crate::state::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Process-wide generation counter, shared by every registry
static TASK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a task: `<unix-nanos>-<counter>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate an identifier unique within this process
    pub fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let count = TASK_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        Self(format!("{}-{}", nanos, count))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options submitted with a task and translated into program flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Language hints, lowercased, in submission order
    pub languages: Vec<String>,

    /// Names of enabled boolean toggles
    pub toggles: Vec<String>,
}

impl TaskOptions {
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.languages = languages
            .into_iter()
            .map(|l| l.as_ref().trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        self
    }

    pub fn with_toggle(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.is_enabled(&name) {
            self.toggles.push(name);
        }
        self
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.toggles.iter().any(|t| t == name)
    }
}

/// Everything the ingestion side supplies to create a task
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Sanitized display filename
    pub filename: String,

    /// Where the uploaded source was stored
    pub source_path: PathBuf,

    pub options: TaskOptions,
}

/// A task record as held by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Display filename, used for the download name
    pub filename: String,

    /// Uploaded input, consumed by the first execution
    pub source_path: PathBuf,

    /// Produced artifact; fixed at creation
    pub output_path: PathBuf,

    pub options: TaskOptions,

    pub status: TaskStatus,

    /// The sweeper reclaims the task once this is in the past
    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Exit code of the last finished execution, if it exited
    pub exit_code: Option<u32>,
}

impl TaskRecord {
    pub fn new(task: NewTask, output_path: PathBuf, ttl: Duration) -> Self {
        Self {
            filename: task.filename,
            source_path: task.source_path,
            output_path,
            options: task.options,
            status: TaskStatus::Pending,
            expires_at: expiry_after(ttl),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            exit_code: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Name offered to the client when downloading the artifact
    pub fn download_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.filename)
    }
}

/// `now + ttl`, saturating for out-of-range durations
pub fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    let delta = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(3650));
    Utc::now() + delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_task_id_format() {
        let id = TaskId::generate();
        let (nanos, count) = id.as_str().split_once('-').unwrap();
        assert!(nanos.parse::<u128>().is_ok());
        assert!(count.parse::<u64>().unwrap() > 0);
    }

    #[test]
    fn test_task_ids_unique_across_threads() {
        let seen = Arc::new(parking_lot::Mutex::new(HashSet::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert!(seen.lock().insert(TaskId::generate()));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(seen.lock().len(), 8000);
    }

    #[test]
    fn test_options_normalize_languages() {
        let options = TaskOptions::default().with_languages(["ENG", " Deu ", ""]);
        assert_eq!(options.languages, vec!["eng", "deu"]);
    }

    #[test]
    fn test_options_toggles_dedup() {
        let options = TaskOptions::default()
            .with_toggle("deskew")
            .with_toggle("force")
            .with_toggle("deskew");
        assert_eq!(options.toggles, vec!["deskew", "force"]);
        assert!(options.is_enabled("force"));
        assert!(!options.is_enabled("rotate"));
    }

    #[test]
    fn test_record_defaults() {
        let record = TaskRecord::new(
            NewTask {
                filename: "report.pdf".into(),
                source_path: "/tmp/files/1-1".into(),
                options: TaskOptions::default(),
            },
            "/tmp/output/1-1-ocr_report.pdf".into(),
            Duration::from_secs(60),
        );

        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.download_name("ocr_"), "ocr_report.pdf");
        assert!(!record.is_expired(Utc::now()));
        assert!(record.is_expired(Utc::now() + chrono::Duration::seconds(120)));
    }
}
