//! JSONL task store under `.mikey_tasks/`.
//!
//! Two line-delimited JSON files: `tasks.jsonl` (the active set, rewritten
//! in full on every mutation) and `archive.jsonl` (append-only). The layout
//! is deliberately merge-friendly for the version-control tool.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mission_core::{is_valid, Clock, Task, TaskId, Validate, UNKNOWN_REF};
use mission_git::{
    commit_path, current_branch, discover_repo, head_short_commit, GitCli, GitError, RepoHandle,
};
use serde::Serialize;

pub const TASK_DIR_NAME: &str = ".mikey_tasks";
pub const ACTIVE_FILE: &str = "tasks.jsonl";
pub const ARCHIVE_FILE: &str = "archive.jsonl";
const GITKEEP_FILE: &str = ".gitkeep";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create task directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to replace {path}: {source}")]
    Replace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize task record: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Record-oriented storage for the active and archived task logs.
pub struct TaskStore {
    task_dir: PathBuf,
    git: GitCli,
    repo: Option<RepoHandle>,
    clock: Arc<dyn Clock>,
}

impl TaskStore {
    /// Open (creating if needed) the task directory under the enclosing
    /// repository root, or under `project_root` when no repository exists.
    pub fn open(
        project_root: &Path,
        git: GitCli,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let repo = match discover_repo(project_root, &git) {
            Ok(repo) => Some(repo),
            Err(err) => {
                log::debug!("no repository at {}: {err}", project_root.display());
                None
            }
        };
        let base = repo
            .as_ref()
            .map(|r| r.root.clone())
            .unwrap_or_else(|| project_root.to_path_buf());
        let task_dir = base.join(TASK_DIR_NAME);

        fs::create_dir_all(&task_dir).map_err(|source| StoreError::CreateDir {
            path: task_dir.clone(),
            source,
        })?;

        let gitkeep = task_dir.join(GITKEEP_FILE);
        if !gitkeep.exists() {
            fs::write(&gitkeep, b"").map_err(|source| StoreError::WriteFile {
                path: gitkeep.clone(),
                source,
            })?;
        }

        Ok(Self {
            task_dir,
            git,
            repo,
            clock,
        })
    }

    pub fn task_dir(&self) -> &Path {
        &self.task_dir
    }

    fn active_path(&self) -> PathBuf {
        self.task_dir.join(ACTIVE_FILE)
    }

    fn archive_path(&self) -> PathBuf {
        self.task_dir.join(ARCHIVE_FILE)
    }

    /// Load the active set in file order.
    ///
    /// Malformed lines and records failing validation are skipped, not
    /// fatal; partial recovery after a bad merge is supported.
    pub fn load_all(&self) -> Result<Vec<Task>, StoreError> {
        let path = self.active_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|source| StoreError::ReadFile {
            path: path.clone(),
            source,
        })?;

        let mut tasks = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Task>(trimmed) {
                Ok(task) => {
                    if is_valid(&task.validate()) {
                        tasks.push(task);
                    } else {
                        log::warn!(
                            "skipping invalid task record at {}:{}",
                            path.display(),
                            idx + 1
                        );
                    }
                }
                Err(err) => {
                    log::warn!(
                        "skipping malformed line at {}:{}: {err}",
                        path.display(),
                        idx + 1
                    );
                }
            }
        }
        Ok(tasks)
    }

    pub fn load(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.load_all()?.into_iter().find(|task| &task.id == id))
    }

    /// Upsert keyed by id, preserving the original insertion index of a
    /// replaced record. Refreshes `branch`, `commit_hash`, and `updated_at`
    /// before the write; `created_at` survives from the stored record.
    pub fn save(&self, mut task: Task) -> Result<Task, StoreError> {
        let mut tasks = self.load_all()?;

        let (branch, commit_hash) = self.vcs_refs();
        task.metadata.branch = branch;
        task.metadata.commit_hash = commit_hash;
        task.metadata.updated_at = self.clock.now();

        match tasks.iter().position(|existing| existing.id == task.id) {
            Some(idx) => {
                task.metadata.created_at = tasks[idx].metadata.created_at;
                tasks[idx] = task.clone();
            }
            None => tasks.push(task.clone()),
        }

        self.write_active(&tasks)?;
        Ok(task)
    }

    /// Remove the record from the active file. `false` when absent.
    pub fn delete(&self, id: &TaskId) -> Result<bool, StoreError> {
        let mut tasks = self.load_all()?;
        let before = tasks.len();
        tasks.retain(|task| &task.id != id);
        if tasks.len() == before {
            return Ok(false);
        }
        self.write_active(&tasks)?;
        Ok(true)
    }

    /// Append the record to the archive log, then remove it from the
    /// active file. Archives the active record as of the moment of the
    /// call. `false` when absent.
    pub fn archive(&self, id: &TaskId) -> Result<bool, StoreError> {
        let mut tasks = self.load_all()?;
        let Some(idx) = tasks.iter().position(|task| &task.id == id) else {
            return Ok(false);
        };
        let record = tasks.remove(idx);
        append_json_line(&self.archive_path(), &record)?;
        self.write_active(&tasks)?;
        Ok(true)
    }

    /// Stage and commit the task directory through the version-control
    /// adapter.
    pub fn commit(&self, message: &str) -> Result<(), GitError> {
        match &self.repo {
            Some(repo) => commit_path(repo, &self.git, &self.task_dir, message),
            None => Err(GitError::NotARepository {
                path: self.task_dir.clone(),
            }),
        }
    }

    fn vcs_refs(&self) -> (String, String) {
        let Some(repo) = &self.repo else {
            return (UNKNOWN_REF.to_string(), UNKNOWN_REF.to_string());
        };
        let branch = current_branch(repo, &self.git).unwrap_or_else(|err| {
            log::debug!("branch lookup failed: {err}");
            UNKNOWN_REF.to_string()
        });
        let commit = head_short_commit(repo, &self.git).unwrap_or_else(|err| {
            log::debug!("commit lookup failed: {err}");
            UNKNOWN_REF.to_string()
        });
        (branch, commit)
    }

    /// Full rewrite of the active file through a temp file and rename, so
    /// a crash mid-write never leaves a truncated log.
    fn write_active(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let path = self.active_path();
        let tmp = self.task_dir.join(format!("{ACTIVE_FILE}.tmp"));

        let mut buf = String::new();
        for task in tasks {
            let line = serde_json::to_string(task)
                .map_err(|source| StoreError::Serialize { source })?;
            buf.push_str(&line);
            buf.push('\n');
        }

        fs::write(&tmp, buf.as_bytes()).map_err(|source| StoreError::WriteFile {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Replace { path, source })?;
        Ok(())
    }
}

fn append_json_line<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let line =
        serde_json::to_string(record).map_err(|source| StoreError::Serialize { source })?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StoreError::Append {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(line.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .map_err(|source| StoreError::Append {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mission_core::{ManualClock, TaskId, TaskStatus};
    use tempfile::TempDir;

    fn manual_clock() -> Arc<ManualClock> {
        let start = chrono::Local.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        Arc::new(ManualClock::new(start))
    }

    /// A store with the git binary pointed at nothing, so every
    /// version-control call degrades to the unknown sentinel.
    fn open_store(dir: &TempDir) -> TaskStore {
        TaskStore::open(
            dir.path(),
            GitCli::new("missing-git-binary-for-tests"),
            manual_clock(),
        )
        .expect("open store")
    }

    fn mk_task(id: &str, title: &str) -> Task {
        Task::new(
            TaskId::new(id),
            title,
            chrono::Local.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn open_creates_directory_and_gitkeep() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.task_dir().is_dir());
        assert!(store.task_dir().join(".gitkeep").exists());
        assert_eq!(store.task_dir(), dir.path().join(TASK_DIR_NAME));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut task = mk_task("m-000001", "First");
        task.description = "long form".to_string();
        task.tags = vec!["infra".to_string()];
        let saved = store.save(task.clone()).expect("save");

        assert_eq!(saved.metadata.branch, UNKNOWN_REF);
        assert_eq!(saved.metadata.commit_hash, UNKNOWN_REF);

        let loaded = store
            .load(&TaskId::new("m-000001"))
            .expect("load")
            .expect("present");
        assert_eq!(loaded.title, "First");
        assert_eq!(loaded.description, "long form");
        assert_eq!(loaded.tags, vec!["infra".to_string()]);
        assert_eq!(loaded, saved);
    }

    #[test]
    fn upsert_preserves_insertion_index() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.save(mk_task("m-a", "A")).unwrap();
        store.save(mk_task("m-b", "B")).unwrap();
        store.save(mk_task("m-c", "C")).unwrap();

        let mut updated = mk_task("m-b", "B updated");
        updated.priority = 9;
        store.save(updated).unwrap();

        let all = store.load_all().unwrap();
        let ids: Vec<&str> = all.iter().map(|t| t.id.as_ref()).collect();
        assert_eq!(ids, vec!["m-a", "m-b", "m-c"]);
        assert_eq!(all[1].title, "B updated");
        assert_eq!(all[1].priority, 9);
    }

    #[test]
    fn idempotent_save_leaves_file_byte_identical() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let saved = store.save(mk_task("m-same", "Same")).unwrap();
        let first = fs::read(dir.path().join(TASK_DIR_NAME).join(ACTIVE_FILE)).unwrap();

        // Clock not advanced, no repository: every refreshed field resolves
        // to the same value, so the rewrite must be byte-identical.
        store.save(saved).unwrap();
        let second = fs::read(dir.path().join(TASK_DIR_NAME).join(ACTIVE_FILE)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn created_at_is_immutable_after_first_persistence() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let store = TaskStore::open(
            dir.path(),
            GitCli::new("missing-git-binary-for-tests"),
            clock.clone(),
        )
        .unwrap();

        let saved = store.save(mk_task("m-t1", "T1")).unwrap();
        let original_created = saved.metadata.created_at;

        clock.advance(chrono::Duration::minutes(5));
        let mut tampered = saved.clone();
        tampered.metadata.created_at = original_created + chrono::Duration::days(1);
        tampered.title = "T1 edited".to_string();
        let resaved = store.save(tampered).unwrap();

        assert_eq!(resaved.metadata.created_at, original_created);
        assert_eq!(
            resaved.metadata.updated_at,
            original_created + chrono::Duration::minutes(5)
        );
    }

    #[test]
    fn delete_removes_record() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.save(mk_task("m-del", "Delete me")).unwrap();
        assert!(store.delete(&TaskId::new("m-del")).unwrap());
        assert!(!store.delete(&TaskId::new("m-del")).unwrap());
        assert!(store.load(&TaskId::new("m-del")).unwrap().is_none());
    }

    #[test]
    fn archive_appends_then_removes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut task = mk_task("m-arc", "Archive me");
        task.status = TaskStatus::Done;
        store.save(task).unwrap();

        assert!(store.archive(&TaskId::new("m-arc")).unwrap());
        assert!(store.load(&TaskId::new("m-arc")).unwrap().is_none());

        let archive = fs::read_to_string(
            dir.path().join(TASK_DIR_NAME).join(ARCHIVE_FILE),
        )
        .unwrap();
        let archived: Task = serde_json::from_str(archive.lines().next().unwrap()).unwrap();
        assert_eq!(archived.id, TaskId::new("m-arc"));
        assert_eq!(archived.status, TaskStatus::Done);

        assert!(!store.archive(&TaskId::new("m-arc")).unwrap());
    }

    #[test]
    fn load_all_skips_malformed_and_invalid_lines() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.save(mk_task("m-ok1", "Good one")).unwrap();

        let path = dir.path().join(TASK_DIR_NAME).join(ACTIVE_FILE);
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("{not json at all\n");
        content.push_str(r#"{"id":"m-bad1","title":"Bad priority","priority":99}"#);
        content.push('\n');
        content.push_str(r#"{"id":"m-ok2","title":"Good two"}"#);
        content.push('\n');
        fs::write(&path, content).unwrap();

        let tasks = store.load_all().unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_ref()).collect();
        assert_eq!(ids, vec!["m-ok1", "m-ok2"]);
    }

    #[test]
    fn rewrite_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.save(mk_task("m-tmp", "Tmp")).unwrap();
        assert!(!dir
            .path()
            .join(TASK_DIR_NAME)
            .join(format!("{ACTIVE_FILE}.tmp"))
            .exists());
    }

    #[test]
    fn commit_without_repository_is_a_soft_failure() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let err = store.commit("message").expect_err("no repository");
        assert!(matches!(err, GitError::NotARepository { .. }));
    }

    #[test]
    fn save_refreshes_metadata_and_commit_records_the_task_dir() {
        let git = GitCli::default();
        if git.run(Path::new("."), ["--version"]).is_err() {
            return; // no git on this machine; nothing to assert
        }

        let dir = TempDir::new().unwrap();
        git.run(dir.path(), ["init", "-b", "main"]).unwrap();
        git.run(dir.path(), ["config", "user.email", "test@example.com"])
            .unwrap();
        git.run(dir.path(), ["config", "user.name", "Test"]).unwrap();
        fs::write(dir.path().join("seed.txt"), "seed\n").unwrap();
        git.run(dir.path(), ["add", "."]).unwrap();
        git.run(dir.path(), ["commit", "-m", "seed"]).unwrap();

        let store = TaskStore::open(dir.path(), git.clone(), manual_clock()).unwrap();
        let saved = store.save(mk_task("m-git", "Tracked")).unwrap();
        assert_eq!(saved.metadata.branch, "main");
        assert_ne!(saved.metadata.commit_hash, UNKNOWN_REF);

        store.commit("record task state").expect("commit");
        let log = git
            .run(dir.path(), ["log", "-1", "--format=%s", "--name-only"])
            .unwrap();
        assert!(log.stdout.contains("record task state"));
        assert!(log.stdout.contains(".mikey_tasks/tasks.jsonl"));
    }

    #[test]
    fn tasks_persist_across_store_instances() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store.save(mk_task("m-per", "Persistent task")).unwrap();
        }
        let store = open_store(&dir);
        let loaded = store
            .load(&TaskId::new("m-per"))
            .unwrap()
            .expect("survives reopen");
        assert_eq!(loaded.title, "Persistent task");
    }
}
