use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::command::GitCli;
use crate::error::GitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub root: PathBuf,
}

pub fn discover_repo(start_path: &Path, git: &GitCli) -> Result<RepoHandle, GitError> {
    let inside = match git.run(start_path, ["rev-parse", "--is-inside-work-tree"]) {
        Ok(output) => output.stdout.trim().eq("true"),
        Err(GitError::CommandFailed { .. }) => false,
        Err(err) => return Err(err),
    };

    if !inside {
        return Err(GitError::NotARepository {
            path: start_path.to_path_buf(),
        });
    }

    let root_raw = git.run(start_path, ["rev-parse", "--show-toplevel"])?;
    Ok(RepoHandle {
        root: PathBuf::from(root_raw.stdout.trim()),
    })
}

pub fn current_branch(repo: &RepoHandle, git: &GitCli) -> Result<String, GitError> {
    let output = git.run(&repo.root, ["rev-parse", "--abbrev-ref", "HEAD"])?;
    Ok(output.stdout.trim().to_string())
}

pub fn head_short_commit(repo: &RepoHandle, git: &GitCli) -> Result<String, GitError> {
    let output = git.run(&repo.root, ["rev-parse", "--short", "HEAD"])?;
    Ok(output.stdout.trim().to_string())
}

pub fn stage_path(repo: &RepoHandle, git: &GitCli, path: &Path) -> Result<(), GitError> {
    git.run(&repo.root, [OsStr::new("add"), path.as_os_str()])?;
    Ok(())
}

/// Stage and commit `path` only; other working-tree changes stay out of
/// the commit.
pub fn commit_path(
    repo: &RepoHandle,
    git: &GitCli,
    path: &Path,
    message: &str,
) -> Result<(), GitError> {
    stage_path(repo, git, path)?;
    git.run(
        &repo.root,
        [
            OsStr::new("commit"),
            OsStr::new("-m"),
            OsStr::new(message),
            OsStr::new("--"),
            path.as_os_str(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn git_available() -> bool {
        GitCli::default()
            .run(Path::new("."), ["--version"])
            .is_ok()
    }

    fn init_repo(git: &GitCli) -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        git.run(dir.path(), ["init", "-b", "main"]).expect("git init");
        git.run(dir.path(), ["config", "user.email", "test@example.com"])
            .expect("config email");
        git.run(dir.path(), ["config", "user.name", "Test"])
            .expect("config name");
        dir
    }

    #[test]
    fn discover_repo_outside_a_repository_fails() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().expect("temp dir");
        let err = discover_repo(dir.path(), &GitCli::default()).expect_err("not a repo");
        assert!(matches!(err, GitError::NotARepository { .. }));
    }

    #[test]
    fn discover_then_branch_and_commit_roundtrip() {
        if !git_available() {
            return;
        }
        let git = GitCli::default();
        let dir = init_repo(&git);

        fs::write(dir.path().join("README.md"), "hello\n").expect("write file");
        git.run(dir.path(), ["add", "."]).expect("stage");
        git.run(dir.path(), ["commit", "-m", "initial"]).expect("commit");

        let repo = discover_repo(dir.path(), &git).expect("discover");
        assert_eq!(
            repo.root.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );

        let branch = current_branch(&repo, &git).expect("branch");
        assert_eq!(branch, "main");

        let sha = head_short_commit(&repo, &git).expect("short sha");
        assert!(!sha.is_empty());
        assert!(sha.len() >= 6);
    }

    #[test]
    fn commit_path_commits_only_that_path() {
        if !git_available() {
            return;
        }
        let git = GitCli::default();
        let dir = init_repo(&git);

        fs::write(dir.path().join("seed.txt"), "seed\n").expect("write seed");
        git.run(dir.path(), ["add", "."]).expect("stage seed");
        git.run(dir.path(), ["commit", "-m", "seed"]).expect("seed commit");

        let repo = discover_repo(dir.path(), &git).expect("discover");

        let tracked = dir.path().join("tasks");
        fs::create_dir_all(&tracked).expect("task dir");
        fs::write(tracked.join("tasks.jsonl"), "{}\n").expect("write tasks");
        fs::write(dir.path().join("untracked.txt"), "leave me\n").expect("write other");

        commit_path(&repo, &git, &tracked, "record tasks").expect("commit path");

        let show = git
            .run(dir.path(), ["show", "--name-only", "--format=", "HEAD"])
            .expect("show");
        assert!(show.stdout.contains("tasks/tasks.jsonl"));
        assert!(!show.stdout.contains("untracked.txt"));
    }
}
