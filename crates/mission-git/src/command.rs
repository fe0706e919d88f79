use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::error::GitError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCli {
    pub binary: PathBuf,
    pub timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GitCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn run<I, S>(&self, cwd: &Path, args: I) -> Result<GitOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let owned_args: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        let rendered = render_command(&self.binary, &owned_args);

        let mut command = Command::new(&self.binary);
        command
            .current_dir(cwd)
            .args(&owned_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| GitError::Io {
            command: rendered.clone(),
            source,
        })?;

        // Take the handles before wait_timeout, which reaps the process.
        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GitError::Timeout {
                    command: rendered,
                    timeout_secs: self.timeout.as_secs(),
                });
            }
            Err(source) => {
                return Err(GitError::Io {
                    command: rendered,
                    source,
                });
            }
        };

        let stdout = read_stream(&mut stdout_handle, &rendered, "stdout")?;
        let stderr = read_stream(&mut stderr_handle, &rendered, "stderr")?;

        if !status.success() {
            return Err(GitError::CommandFailed {
                command: rendered,
                status: status.code(),
                stdout,
                stderr,
            });
        }

        Ok(GitOutput { stdout, stderr })
    }
}

fn read_stream<R: Read>(
    handle: &mut Option<R>,
    command: &str,
    stream: &'static str,
) -> Result<String, GitError> {
    let mut buf = Vec::new();
    if let Some(reader) = handle.as_mut() {
        reader.read_to_end(&mut buf).map_err(|source| GitError::Io {
            command: command.to_string(),
            source,
        })?;
    }
    String::from_utf8(buf).map_err(|source| GitError::NonUtf8Output {
        command: command.to_string(),
        stream,
        source,
    })
}

fn render_command(binary: &Path, args: &[OsString]) -> String {
    let mut rendered = binary.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_an_io_error() {
        let git = GitCli::new("definitely-not-a-real-git-binary");
        let err = git
            .run(Path::new("."), ["--version"])
            .expect_err("missing binary");
        assert!(matches!(err, GitError::Io { .. }));
        assert!(err.to_string().contains("--version"));
    }

    #[test]
    fn default_timeout_is_five_seconds() {
        assert_eq!(GitCli::default().timeout, Duration::from_secs(5));
    }

    #[test]
    fn version_probe_succeeds_when_git_is_installed() {
        let git = GitCli::default();
        let Ok(output) = git.run(Path::new("."), ["--version"]) else {
            return; // no git on this machine; nothing to assert
        };
        assert!(output.stdout.contains("git version"));
    }
}
