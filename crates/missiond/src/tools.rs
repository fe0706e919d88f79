//! Tool adapter: the request/response surface driven by an agent.
//!
//! Each tool takes a JSON object and returns a JSON object carrying at
//! least a boolean `success`, plus either a payload or an `error` string.
//! Handlers translate directly onto the mission control facade.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use mission_core::{Clock, TaskId, TaskStatus};
use mission_git::GitCli;
use serde_json::{json, Map, Value};

use crate::control::MissionControl;

pub const NEWLY_READY_LIMIT: usize = 5;
pub const BLOCKED_SUMMARY_LIMIT: usize = 5;

pub const TOOL_NAMES: &[&str] = &[
    "create_task",
    "update_task_status",
    "list_ready_work",
    "list_tasks",
    "check_consistency",
    "task_summary",
    "get_task",
    "commit_tasks",
    "delete_task",
];

/// Lazily-initialized mission control instances keyed by project path.
///
/// `project_path` in a request selects the repository to operate on; when
/// absent, the registry's default root (resolved once at construction)
/// is used.
pub struct ToolRegistry {
    default_root: PathBuf,
    git: GitCli,
    clock: Arc<dyn Clock>,
    controls: Mutex<HashMap<PathBuf, Arc<MissionControl>>>,
}

impl ToolRegistry {
    pub fn new(default_root: PathBuf, git: GitCli, clock: Arc<dyn Clock>) -> Self {
        Self {
            default_root,
            git,
            clock,
            controls: Mutex::new(HashMap::new()),
        }
    }

    pub fn dispatch(&self, tool: &str, args: &Value) -> Value {
        let result = self
            .control_for(args)
            .and_then(|mc| self.invoke(&mc, tool, args));
        match result {
            Ok(payload) => payload,
            Err(error) => json!({ "success": false, "error": error }),
        }
    }

    fn invoke(&self, mc: &MissionControl, tool: &str, args: &Value) -> Result<Value, String> {
        match tool {
            "create_task" => handle_create_task(mc, args),
            "update_task_status" => handle_update_task_status(mc, args),
            "list_ready_work" => handle_list_ready_work(mc),
            "list_tasks" => handle_list_tasks(mc, args),
            "check_consistency" => handle_check_consistency(mc),
            "task_summary" => handle_task_summary(mc),
            "get_task" => handle_get_task(mc, args),
            "commit_tasks" => handle_commit_tasks(mc, args),
            "delete_task" => handle_delete_task(mc, args),
            other => Err(format!("Unknown tool: {other}")),
        }
    }

    fn control_for(&self, args: &Value) -> Result<Arc<MissionControl>, String> {
        let root = match args.get("project_path").and_then(Value::as_str) {
            Some(path) => PathBuf::from(path),
            None => self.default_root.clone(),
        };

        let mut controls = self.controls.lock().map_err(|_| "registry poisoned")?;
        if let Some(existing) = controls.get(&root) {
            return Ok(existing.clone());
        }
        let mc = MissionControl::open(&root, self.git.clone(), self.clock.clone())
            .map_err(|err| err.to_string())?;
        let mc = Arc::new(mc);
        controls.insert(root, mc.clone());
        Ok(mc)
    }
}

fn handle_create_task(mc: &MissionControl, args: &Value) -> Result<Value, String> {
    let title = require_str(args, "title")?;
    let description = args
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let depends_on = optional_string_list(args, "depends_on")?
        .into_iter()
        .map(TaskId::new)
        .collect();
    let tags = optional_string_list(args, "tags")?;
    let priority = optional_int(args, "priority")?;

    let task = mc
        .create_task(title, description, depends_on, tags, priority)
        .map_err(|err| err.to_string())?;
    Ok(json!({
        "success": true,
        "task": task_value(&task)?,
        "message": format!("Created task {} '{}'", task.id, task.title),
    }))
}

fn handle_update_task_status(mc: &MissionControl, args: &Value) -> Result<Value, String> {
    let task_id = TaskId::new(require_str(args, "task_id")?);
    let status: TaskStatus = require_str(args, "status")?.parse()?;

    let task = mc
        .update_task_status(&task_id, status, true)
        .map_err(|err| err.to_string())?;

    // Everything currently ready minus the task just changed. This can
    // include tasks that were already ready before the change.
    let newly_ready: Vec<Value> = mc
        .list_ready_work()
        .map_err(|err| err.to_string())?
        .iter()
        .filter(|ready| ready.id != task_id)
        .take(NEWLY_READY_LIMIT)
        .map(task_value)
        .collect::<Result<_, _>>()?;

    Ok(json!({
        "success": true,
        "task": task_value(&task)?,
        "newly_ready": newly_ready,
        "message": format!("Updated task {task_id} to {status}"),
    }))
}

fn handle_list_ready_work(mc: &MissionControl) -> Result<Value, String> {
    let ready = mc.list_ready_work().map_err(|err| err.to_string())?;
    let blocked = mc.list_blocked().map_err(|err| err.to_string())?;

    let tasks: Vec<Value> = ready.iter().map(task_value).collect::<Result<_, _>>()?;
    let mut payload = json!({
        "success": true,
        "count": ready.len(),
        "tasks": tasks,
        "message": format!("{} task(s) ready to work on", ready.len()),
    });

    if !blocked.is_empty() {
        let summary: Vec<Value> = blocked
            .iter()
            .take(BLOCKED_SUMMARY_LIMIT)
            .map(|(task, blockers)| {
                json!({
                    "id": task.id,
                    "title": task.title,
                    "blocked_by": blockers,
                })
            })
            .collect();
        let object = payload.as_object_mut().ok_or("internal error: payload must be an object")?;
        object.insert("blocked_count".to_string(), json!(blocked.len()));
        object.insert("blocked_summary".to_string(), json!(summary));
    }

    Ok(payload)
}

fn handle_list_tasks(mc: &MissionControl, args: &Value) -> Result<Value, String> {
    let status = match args.get("status").and_then(Value::as_str) {
        Some(raw) => Some(raw.parse::<TaskStatus>()?),
        None => None,
    };
    let tags = optional_string_list(args, "tags")?;

    let tasks = mc.list_tasks(status, &tags).map_err(|err| err.to_string())?;
    let rendered: Vec<Value> = tasks.iter().map(task_value).collect::<Result<_, _>>()?;

    let mut filters = Map::new();
    if let Some(status) = status {
        filters.insert("status".to_string(), json!(status));
    }
    if !tags.is_empty() {
        filters.insert("tags".to_string(), json!(tags));
    }

    Ok(json!({
        "success": true,
        "count": tasks.len(),
        "tasks": rendered,
        "filters_applied": filters,
    }))
}

fn handle_check_consistency(mc: &MissionControl) -> Result<Value, String> {
    let (is_consistent, errors) = mc.check_consistency().map_err(|err| err.to_string())?;
    let message = if is_consistent {
        "All task dependencies are consistent".to_string()
    } else {
        format!("{} consistency issue(s) found", errors.len())
    };
    Ok(json!({
        "success": true,
        "is_consistent": is_consistent,
        "errors": errors,
        "message": message,
    }))
}

fn handle_task_summary(mc: &MissionControl) -> Result<Value, String> {
    let summary = mc.summary().map_err(|err| err.to_string())?;
    let mut payload = serde_json::to_value(summary).map_err(|err| err.to_string())?;
    let object = payload.as_object_mut().ok_or("internal error: summary must be an object")?;
    object.insert("success".to_string(), json!(true));
    Ok(payload)
}

fn handle_get_task(mc: &MissionControl, args: &Value) -> Result<Value, String> {
    let task_id = TaskId::new(require_str(args, "task_id")?);
    let task = mc.get_task(&task_id).map_err(|err| err.to_string())?;

    let mut payload = json!({
        "success": true,
        "task": task_value(&task)?,
    });
    let object = payload.as_object_mut().ok_or("internal error: payload must be an object")?;

    if optional_bool(args, "include_chain")? {
        let chain = mc.get_task_chain(&task_id).map_err(|err| err.to_string())?;
        let rendered: Vec<Value> = chain.iter().map(task_value).collect::<Result<_, _>>()?;
        object.insert("dependency_chain".to_string(), json!(rendered));
    }
    if optional_bool(args, "include_impact")? {
        let impact = mc.get_task_impact(&task_id).map_err(|err| err.to_string())?;
        let rendered: Vec<Value> = impact.iter().map(task_value).collect::<Result<_, _>>()?;
        object.insert("dependent_tasks".to_string(), json!(rendered));
    }

    Ok(payload)
}

fn handle_commit_tasks(mc: &MissionControl, args: &Value) -> Result<Value, String> {
    let message = args.get("message").and_then(Value::as_str);
    let committed = mc.commit(message).map_err(|err| err.to_string())?;
    Ok(json!({
        "success": true,
        "message": format!("Committed task state: {committed}"),
    }))
}

fn handle_delete_task(mc: &MissionControl, args: &Value) -> Result<Value, String> {
    let task_id = TaskId::new(require_str(args, "task_id")?);

    // The facade deletes unconditionally; the dependent guard lives here.
    let dependents = mc
        .get_task_impact(&task_id)
        .map_err(|err| err.to_string())?;
    if !dependents.is_empty() {
        let dependent_ids: Vec<&str> = dependents.iter().map(|t| t.id.as_ref()).collect();
        return Ok(json!({
            "success": false,
            "error": format!(
                "Task '{task_id}' has {} dependent task(s); reassign or delete them first",
                dependents.len()
            ),
            "dependent_tasks": dependent_ids,
        }));
    }

    mc.delete_task(&task_id).map_err(|err| err.to_string())?;
    Ok(json!({
        "success": true,
        "message": format!("Deleted task {task_id}"),
    }))
}

fn task_value(task: &mission_core::Task) -> Result<Value, String> {
    serde_json::to_value(task).map_err(|err| err.to_string())
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing required argument: {key}"))
}

fn optional_string_list(args: &Value, key: &str) -> Result<Vec<String>, String> {
    let Some(value) = args.get(key) else {
        return Ok(Vec::new());
    };
    let items = value
        .as_array()
        .ok_or_else(|| format!("Argument '{key}' must be an array of strings"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(ToString::to_string)
                .ok_or_else(|| format!("Argument '{key}' must be an array of strings"))
        })
        .collect()
}

fn optional_int(args: &Value, key: &str) -> Result<Option<i64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("Argument '{key}' must be an integer")),
    }
}

fn optional_bool(args: &Value, key: &str) -> Result<bool, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| format!("Argument '{key}' must be a boolean")),
    }
}
