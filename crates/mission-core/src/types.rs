//! Task model: ids, statuses, version-control metadata.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel recorded when the version-control tool is absent or fails.
pub const UNKNOWN_REF: &str = "unknown";

pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 10;
pub const PRIORITY_DEFAULT: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive a task id from the title and a nanosecond timestamp.
///
/// `m-` followed by the first 6 hex chars of SHA-256 over title ‖ nanos.
pub fn derive_task_id(title: &str, timestamp_nanos: i64) -> TaskId {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(timestamp_nanos.to_string().as_bytes());
    let digest = hasher.finalize();
    TaskId(format!("m-{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        }
    }

    pub fn all() -> [TaskStatus; 4] {
        [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Done,
        ]
    }

    pub fn is_done(self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!(
                "invalid task status '{other}'. valid values: todo, in_progress, blocked, done"
            )),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version-control context captured at save time.
///
/// `branch` and `commit_hash` are refreshed on every save; `created_at` is
/// immutable after first persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsMetadata {
    #[serde(default = "unknown_ref")]
    pub branch: String,
    #[serde(default = "unknown_ref")]
    pub commit_hash: String,
    #[serde(default = "now_local")]
    pub created_at: DateTime<Local>,
    #[serde(default = "now_local")]
    pub updated_at: DateTime<Local>,
}

fn unknown_ref() -> String {
    UNKNOWN_REF.to_string()
}

fn now_local() -> DateTime<Local> {
    Local::now()
}

impl VcsMetadata {
    pub fn at(now: DateTime<Local>) -> Self {
        Self {
            branch: unknown_ref(),
            commit_hash: unknown_ref(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for VcsMetadata {
    fn default() -> Self {
        Self::at(Local::now())
    }
}

/// A unit of work with dependencies, status, priority, and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    /// Derived at query time: the unresolved subset of `depends_on`.
    /// Whatever is persisted here is rebuilt on read.
    #[serde(default)]
    pub blocked_by: Vec<TaskId>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub metadata: VcsMetadata,
}

fn default_priority() -> u8 {
    PRIORITY_DEFAULT
}

impl Task {
    /// Create a new `todo` task with default priority.
    pub fn new(id: TaskId, title: impl Into<String>, now: DateTime<Local>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            depends_on: Vec::new(),
            blocked_by: Vec::new(),
            tags: Vec::new(),
            priority: PRIORITY_DEFAULT,
            metadata: VcsMetadata::at(now),
        }
    }

    /// Add explicit dependency.
    pub fn with_dependency(mut self, dep: TaskId) -> Self {
        self.depends_on.push(dep);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

pub fn priority_in_range(value: u8) -> bool {
    (PRIORITY_MIN..=PRIORITY_MAX).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn task_status_serializes_as_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let decoded: TaskStatus = serde_json::from_str("\"done\"").unwrap();
        assert_eq!(decoded, TaskStatus::Done);
    }

    #[test]
    fn task_status_parse_rejects_unknown_value() {
        let err = "paused".parse::<TaskStatus>().expect_err("unknown status");
        assert!(err.contains("invalid task status 'paused'"));
        assert!(err.contains("todo, in_progress, blocked, done"));
    }

    #[test]
    fn task_status_parse_is_case_insensitive() {
        assert_eq!("TODO".parse::<TaskStatus>().unwrap(), TaskStatus::Todo);
        assert_eq!(
            " In_Progress ".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
    }

    #[test]
    fn derived_id_has_expected_shape() {
        let id = derive_task_id("Write docs", 1_717_243_200_000_000_000);
        assert!(id.0.starts_with("m-"));
        assert_eq!(id.0.len(), 8);
        assert!(id.0[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn derived_id_is_stable_for_same_inputs() {
        let a = derive_task_id("Same", 42);
        let b = derive_task_id("Same", 42);
        assert_eq!(a, b);
        let c = derive_task_id("Same", 43);
        assert_ne!(a, c);
    }

    #[test]
    fn new_task_defaults() {
        let task = Task::new(TaskId::new("m-abc123"), "First", fixed_now());
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, PRIORITY_DEFAULT);
        assert!(task.depends_on.is_empty());
        assert_eq!(task.metadata.branch, UNKNOWN_REF);
        assert_eq!(task.metadata.created_at, task.metadata.updated_at);
    }

    #[test]
    fn task_deserializes_with_missing_optional_keys() {
        let task: Task =
            serde_json::from_str(r#"{"id":"m-000001","title":"Bare"}"#).expect("minimal record");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, PRIORITY_DEFAULT);
        assert!(task.description.is_empty());
        assert!(task.tags.is_empty());
        assert_eq!(task.metadata.branch, UNKNOWN_REF);
    }

    #[test]
    fn task_deserialization_drops_unknown_keys() {
        let task: Task = serde_json::from_str(
            r#"{"id":"m-000002","title":"Extra","assignee":"mikey","estimate_hours":3}"#,
        )
        .expect("unknown keys tolerated");
        assert_eq!(task.title, "Extra");
    }

    #[test]
    fn task_round_trips_through_json() {
        let mut task = Task::new(TaskId::new("m-cafe01"), "Round trip", fixed_now())
            .with_dependency(TaskId::new("m-dead02"))
            .with_priority(9);
        task.tags = vec!["infra".to_string()];
        task.description = "long form".to_string();

        let json = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn priority_range_check() {
        assert!(!priority_in_range(0));
        assert!(priority_in_range(1));
        assert!(priority_in_range(10));
        assert!(!priority_in_range(11));
    }
}
