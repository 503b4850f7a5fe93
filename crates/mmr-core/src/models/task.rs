use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::datetime_from_millis;

/// Name of a background task. The server may add names the client does not know.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskKind {
    StorageMigration,
    Quarantine,
    Purge,
    Other(String),
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "storage_migration" => TaskKind::StorageMigration,
            "quarantine" => TaskKind::Quarantine,
            "purge" => TaskKind::Purge,
            _ => TaskKind::Other(s),
        }
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        kind.to_string()
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskKind::StorageMigration => write!(f, "storage_migration"),
            TaskKind::Quarantine => write!(f, "quarantine"),
            TaskKind::Purge => write!(f, "purge"),
            TaskKind::Other(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of a server-side background task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundTask {
    pub task_id: i64,
    pub task_name: TaskKind,
    /// Task parameters; the schema is owned by the server and varies per task name.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    pub start_ts: i64,
    /// 0 while the task is still running.
    #[serde(default)]
    pub end_ts: i64,
    #[serde(default)]
    pub is_finished: bool,
    /// Empty when the task has not failed.
    #[serde(default)]
    pub error_message: String,
}

impl BackgroundTask {
    pub fn is_running(&self) -> bool {
        !self.is_finished
    }

    /// Error flag, independent of whether the task has finished.
    pub fn has_error(&self) -> bool {
        !self.error_message.is_empty()
    }

    pub fn status(&self) -> TaskStatus {
        match (self.is_finished, self.has_error()) {
            (false, _) => TaskStatus::Running,
            (true, true) => TaskStatus::Failed,
            (true, false) => TaskStatus::Completed,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        datetime_from_millis(self.start_ts)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        (self.end_ts != 0).then(|| datetime_from_millis(self.end_ts))
    }

    /// Time spent so far. A task without an end timestamp is measured against `now`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let end_ms = if self.end_ts == 0 {
            now.timestamp_millis()
        } else {
            self.end_ts
        };
        Duration::milliseconds((end_ms - self.start_ts).max(0))
    }

    pub fn format_duration(&self, now: DateTime<Utc>) -> String {
        let secs = self.elapsed(now).num_seconds();
        if self.end_ts == 0 {
            format!("{}s (running)", secs)
        } else {
            format!("{}s", secs)
        }
    }
}

/// Reference to a background task started by an admin call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub task_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task(json: serde_json::Value) -> BackgroundTask {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_task_kind_from_wire() {
        let t = task(serde_json::json!({
            "task_id": 1,
            "task_name": "storage_migration",
            "params": { "source_datastore_id": "a", "target_datastore_id": "b" },
            "start_ts": 1_000,
            "end_ts": 5_000,
            "is_finished": true,
            "error_message": ""
        }));
        assert_eq!(t.task_name, TaskKind::StorageMigration);
        assert_eq!(t.params["target_datastore_id"], "b");
        assert_eq!(t.status(), TaskStatus::Completed);

        let other = task(serde_json::json!({ "task_id": 2, "task_name": "reindex", "start_ts": 0 }));
        assert_eq!(other.task_name, TaskKind::Other("reindex".to_string()));
        assert_eq!(other.task_name.to_string(), "reindex");
    }

    #[test]
    fn test_error_is_orthogonal_to_finished() {
        let failed = task(serde_json::json!({
            "task_id": 3,
            "task_name": "purge",
            "start_ts": 0,
            "end_ts": 10,
            "is_finished": true,
            "error_message": "datastore unavailable"
        }));
        assert!(failed.has_error());
        assert_eq!(failed.status(), TaskStatus::Failed);

        let running_with_error = BackgroundTask {
            is_finished: false,
            end_ts: 0,
            ..failed
        };
        assert!(running_with_error.has_error());
        assert_eq!(running_with_error.status(), TaskStatus::Running);
    }

    #[test]
    fn test_running_duration_uses_now() {
        let t = task(serde_json::json!({
            "task_id": 4,
            "task_name": "quarantine",
            "start_ts": 1_700_000_000_000_i64,
            "end_ts": 0,
            "is_finished": false
        }));
        let now = Utc.timestamp_millis_opt(1_700_000_042_500).unwrap();
        assert_eq!(t.elapsed(now).num_seconds(), 42);
        assert_eq!(t.format_duration(now), "42s (running)");
        assert!(t.ended_at().is_none());

        let later = now + Duration::seconds(10);
        assert_eq!(t.format_duration(later), "52s (running)");
    }

    #[test]
    fn test_finished_duration_ignores_now() {
        let t = task(serde_json::json!({
            "task_id": 5,
            "task_name": "purge",
            "start_ts": 1_000,
            "end_ts": 91_000,
            "is_finished": true
        }));
        let now = Utc.timestamp_millis_opt(9_999_999).unwrap();
        assert_eq!(t.format_duration(now), "90s");
        assert_eq!(t.ended_at().map(|d| d.timestamp_millis()), Some(91_000));
    }
}
