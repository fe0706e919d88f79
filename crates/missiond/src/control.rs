//! Mission control facade.
//!
//! Composes the task store and the dependency graph behind the public
//! operation surface, enforcing boundary validation and the auto-archive
//! lifecycle rule.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use mission_core::{
    derive_task_id, priority_in_range, Clock, Task, TaskId, TaskStatus, PRIORITY_DEFAULT,
    PRIORITY_MAX, PRIORITY_MIN,
};
use mission_git::GitCli;
use serde::Serialize;

use crate::graph::GraphView;
use crate::store::{StoreError, TaskStore};

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("priority {value} out of range {PRIORITY_MIN}..={PRIORITY_MAX}")]
    PriorityOutOfRange { value: i64 },
    #[error("task not found: {id}")]
    NotFound { id: TaskId },
    #[error("commit failed: {reason}")]
    CommitFailed { reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Partial update; omitted fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub depends_on: Option<Vec<TaskId>>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadySummaryEntry {
    pub id: TaskId,
    pub title: String,
    pub priority: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionSummary {
    pub total_tasks: usize,
    pub by_status: BTreeMap<String, usize>,
    pub ready_count: usize,
    pub ready_tasks: Vec<ReadySummaryEntry>,
    pub is_consistent: bool,
    pub consistency_errors: Vec<String>,
    pub task_dir: String,
}

pub const READY_SUMMARY_LIMIT: usize = 5;

pub struct MissionControl {
    store: TaskStore,
    clock: Arc<dyn Clock>,
}

impl MissionControl {
    pub fn open(
        project_root: &Path,
        git: GitCli,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ControlError> {
        let store = TaskStore::open(project_root, git, clock.clone())?;
        Ok(Self { store, clock })
    }

    pub fn task_dir(&self) -> &Path {
        self.store.task_dir()
    }

    fn graph(&self) -> Result<GraphView, ControlError> {
        Ok(GraphView::build(self.store.load_all()?))
    }

    pub fn create_task(
        &self,
        title: &str,
        description: &str,
        depends_on: Vec<TaskId>,
        tags: Vec<String>,
        priority: Option<i64>,
    ) -> Result<Task, ControlError> {
        if title.trim().is_empty() {
            return Err(ControlError::EmptyTitle);
        }
        let priority = validate_priority(priority)?;

        let now = self.clock.now();
        let nanos = now.timestamp_nanos_opt().unwrap_or_default();
        let mut task = Task::new(derive_task_id(title, nanos), title, now);
        task.description = description.to_string();
        task.depends_on = depends_on;
        task.tags = tags;
        task.priority = priority;

        Ok(self.store.save(task)?)
    }

    /// Fetch one task with its derived `blocked_by` rebuilt from the
    /// current active set.
    pub fn get_task(&self, id: &TaskId) -> Result<Task, ControlError> {
        let graph = self.graph()?;
        let mut task = graph
            .get(id)
            .cloned()
            .ok_or_else(|| ControlError::NotFound { id: id.clone() })?;
        task.blocked_by = graph.blockers_of(&task);
        Ok(task)
    }

    /// List active tasks, optionally filtered by status and by tag
    /// intersection (any shared tag matches). `blocked_by` is rebuilt on
    /// every listed task.
    pub fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        tags: &[String],
    ) -> Result<Vec<Task>, ControlError> {
        let graph = self.graph()?;
        let tasks = self
            .store
            .load_all()?
            .into_iter()
            .filter(|task| status.map_or(true, |wanted| task.status == wanted))
            .filter(|task| {
                tags.is_empty() || task.tags.iter().any(|tag| tags.contains(tag))
            })
            .map(|mut task| {
                task.blocked_by = graph.blockers_of(&task);
                task
            })
            .collect();
        Ok(tasks)
    }

    pub fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, ControlError> {
        let mut task = self
            .store
            .load(id)?
            .ok_or_else(|| ControlError::NotFound { id: id.clone() })?;

        if let Some(title) = patch.title {
            if title.trim().is_empty() {
                return Err(ControlError::EmptyTitle);
            }
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(depends_on) = patch.depends_on {
            task.depends_on = depends_on;
        }
        if let Some(tags) = patch.tags {
            task.tags = tags;
        }
        if let Some(priority) = patch.priority {
            task.priority = validate_priority(Some(priority))?;
        }

        Ok(self.store.save(task)?)
    }

    /// Set the status and persist. When `auto_archive` is on and the task
    /// reaches `done` with no dependents in the active set, it moves to
    /// the archive log.
    pub fn update_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        auto_archive: bool,
    ) -> Result<Task, ControlError> {
        let mut task = self
            .store
            .load(id)?
            .ok_or_else(|| ControlError::NotFound { id: id.clone() })?;
        task.status = status;
        let task = self.store.save(task)?;

        if auto_archive && status.is_done() && self.graph()?.dependents(id).is_empty() {
            self.store.archive(id)?;
        }
        Ok(task)
    }

    /// Unconditional removal from the active set. Callers that need to
    /// protect dependents consult `get_task_impact` first.
    pub fn delete_task(&self, id: &TaskId) -> Result<(), ControlError> {
        if self.store.delete(id)? {
            Ok(())
        } else {
            Err(ControlError::NotFound { id: id.clone() })
        }
    }

    pub fn list_ready_work(&self) -> Result<Vec<Task>, ControlError> {
        Ok(self.graph()?.ready_tasks())
    }

    pub fn list_blocked(&self) -> Result<Vec<(Task, Vec<TaskId>)>, ControlError> {
        Ok(self.graph()?.blocked_tasks())
    }

    pub fn check_consistency(&self) -> Result<(bool, Vec<String>), ControlError> {
        Ok(self.graph()?.check_consistency())
    }

    pub fn get_task_chain(&self, id: &TaskId) -> Result<Vec<Task>, ControlError> {
        self.graph()?
            .chain(id)
            .ok_or_else(|| ControlError::NotFound { id: id.clone() })
    }

    pub fn get_task_impact(&self, id: &TaskId) -> Result<Vec<Task>, ControlError> {
        let graph = self.graph()?;
        if !graph.contains(id) {
            return Err(ControlError::NotFound { id: id.clone() });
        }
        Ok(graph.dependents(id))
    }

    /// Commit the task directory; auto-generates the message when omitted.
    pub fn commit(&self, message: Option<&str>) -> Result<String, ControlError> {
        let message = match message {
            Some(message) => message.to_string(),
            None => {
                let graph = self.graph()?;
                let tasks = self.store.load_all()?;
                let done = tasks
                    .iter()
                    .filter(|task| task.status.is_done())
                    .count();
                format!(
                    "Mission control: {} tasks ({} ready, {} done)",
                    tasks.len(),
                    graph.ready_tasks().len(),
                    done
                )
            }
        };
        self.store
            .commit(&message)
            .map_err(|err| ControlError::CommitFailed {
                reason: err.to_string(),
            })?;
        Ok(message)
    }

    pub fn summary(&self) -> Result<MissionSummary, ControlError> {
        let tasks = self.store.load_all()?;
        let graph = GraphView::build(tasks.clone());

        let mut by_status: BTreeMap<String, usize> = TaskStatus::all()
            .into_iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect();
        for task in &tasks {
            *by_status.entry(task.status.as_str().to_string()).or_default() += 1;
        }

        let ready = graph.ready_tasks();
        let (is_consistent, consistency_errors) = graph.check_consistency();
        let task_dir = self
            .store
            .task_dir()
            .canonicalize()
            .unwrap_or_else(|_| self.store.task_dir().to_path_buf());

        Ok(MissionSummary {
            total_tasks: tasks.len(),
            by_status,
            ready_count: ready.len(),
            ready_tasks: ready
                .iter()
                .take(READY_SUMMARY_LIMIT)
                .map(|task| ReadySummaryEntry {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    priority: task.priority,
                })
                .collect(),
            is_consistent,
            consistency_errors,
            task_dir: task_dir.display().to_string(),
        })
    }
}

fn validate_priority(priority: Option<i64>) -> Result<u8, ControlError> {
    let Some(value) = priority else {
        return Ok(PRIORITY_DEFAULT);
    };
    let narrowed = u8::try_from(value)
        .map_err(|_| ControlError::PriorityOutOfRange { value })?;
    if !priority_in_range(narrowed) {
        return Err(ControlError::PriorityOutOfRange { value });
    }
    Ok(narrowed)
}
