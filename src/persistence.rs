use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::StoreError;
use crate::session_log::{LogEntry, SessionRecord, SessionStats};

const LOG_PREFIX: &str = "behavior_log_";
const SUMMARY_PREFIX: &str = "session_summary_";

/// Where a flushed session ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub log_path: PathBuf,
    pub summary_path: PathBuf,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn flush_session(&self, record: &SessionRecord) -> Result<SessionHandle, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub average_fps: f64,
    pub logged_entries: usize,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize, Deserialize)]
struct BehaviorLogFile {
    session_id: String,
    started_at: DateTime<Utc>,
    entries: Vec<LogEntry>,
}

/// Writes each session as a pair of pretty-printed JSON files.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{LOG_PREFIX}{session_id}.json"))
    }

    fn summary_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{SUMMARY_PREFIX}{session_id}.json"))
    }

    /// Summaries of every stored session, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut reader = match fs::read_dir(&self.dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !(name.starts_with(SUMMARY_PREFIX) && name.ends_with(".json")) {
                continue;
            }

            let raw = fs::read_to_string(entry.path()).await?;
            match serde_json::from_str::<SessionSummary>(&raw) {
                Ok(summary) => sessions.push(summary),
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "skipping unreadable session summary")
                }
            }
        }

        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    pub async fn load_entries(&self, session_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        let path = self.log_path(session_id);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(session_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let file: BehaviorLogFile = serde_json::from_str(&raw)?;
        Ok(file.entries)
    }

    /// Removes both files of a session. Missing either file is tolerated as long
    /// as one existed.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let mut removed = false;
        for path in [self.log_path(session_id), self.summary_path(session_id)] {
            match fs::remove_file(&path).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if !removed {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        tracing::info!(session_id, "session deleted");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn flush_session(&self, record: &SessionRecord) -> Result<SessionHandle, StoreError> {
        fs::create_dir_all(&self.dir).await?;

        let log = BehaviorLogFile {
            session_id: record.session_id.clone(),
            started_at: record.started_at,
            entries: record.entries.clone(),
        };
        let summary = SessionSummary {
            session_id: record.session_id.clone(),
            started_at: record.started_at,
            ended_at: record.ended_at,
            duration_secs: record.duration_secs,
            average_fps: record.average_fps,
            logged_entries: record.entries.len(),
            stats: record.stats.clone(),
        };

        let handle = SessionHandle {
            session_id: record.session_id.clone(),
            log_path: self.log_path(&record.session_id),
            summary_path: self.summary_path(&record.session_id),
        };
        fs::write(&handle.log_path, serde_json::to_string_pretty(&log)?).await?;
        fs::write(&handle.summary_path, serde_json::to_string_pretty(&summary)?).await?;

        tracing::info!(
            session_id = %record.session_id,
            frames = record.stats.total_frames,
            alerts = record.stats.alerts_triggered,
            file = %handle.summary_path.display(),
            "session saved"
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::session_log::session_id_for;
    use crate::types::{Activity, AlertTier, ClassificationDetails};

    fn record(started_at: DateTime<Utc>, frames: u64) -> SessionRecord {
        let entries = (0..frames)
            .map(|n| LogEntry {
                timestamp: started_at + Duration::milliseconds(200 * n as i64),
                relative_time: 0.2 * n as f64,
                activity: Activity::EyesOnRoad,
                tier: AlertTier::Safe,
                confidence: 0.8,
                details: ClassificationDetails::message("Driver alert and focused"),
            })
            .collect();
        let mut stats = SessionStats {
            total_frames: frames,
            ..Default::default()
        };
        stats.per_activity_counts.insert(Activity::EyesOnRoad, frames);

        SessionRecord {
            session_id: session_id_for(started_at),
            started_at,
            ended_at: started_at + Duration::seconds(10),
            duration_secs: 10.0,
            average_fps: frames as f64 / 10.0,
            stats,
            entries,
        }
    }

    #[tokio::test]
    async fn flush_writes_log_and_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("sessions"));
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        let handle = store.flush_session(&record(started, 50)).await.expect("flush");

        assert_eq!(handle.session_id, "2024-05-01T08-30-00");
        assert!(handle.log_path.ends_with("behavior_log_2024-05-01T08-30-00.json"));
        assert!(handle.summary_path.ends_with("session_summary_2024-05-01T08-30-00.json"));

        let entries = store.load_entries(&handle.session_id).await.expect("load");
        assert_eq!(entries.len(), 50);

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&handle.summary_path).expect("summary written"),
        )
        .expect("valid json");
        assert_eq!(summary["average_fps"], 5.0);
        assert_eq!(summary["stats"]["per_activity_counts"]["eyes_on_road"], 50);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_delete_removes_both_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());
        let older = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();

        store.flush_session(&record(older, 3)).await.expect("flush");
        let handle = store.flush_session(&record(newer, 4)).await.expect("flush");

        let sessions = store.list_sessions().await.expect("list");
        let ids: Vec<_> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, ["2024-05-02T08-00-00", "2024-05-01T08-00-00"]);
        assert_eq!(sessions[0].logged_entries, 4);

        store.delete_session(&handle.session_id).await.expect("delete");
        assert!(!handle.log_path.exists());
        assert!(!handle.summary_path.exists());
        assert_eq!(store.list_sessions().await.expect("list").len(), 1);

        assert!(matches!(
            store.delete_session(&handle.session_id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("never-created"));
        assert!(store.list_sessions().await.expect("list").is_empty());
    }
}
