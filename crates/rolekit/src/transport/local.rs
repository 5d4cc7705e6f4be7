//! Local shell executor

use super::{finish, sudo_wrap};
use crate::error::{Error, Result};
use crate::executor::Executor;
use std::path::PathBuf;
use std::process::Command;

/// Runs commands through `sh -c` on the current machine.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    workdir: Option<PathBuf>,
    allow_sudo: bool,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            workdir: None,
            allow_sudo: true,
        }
    }

    /// Run every command from `dir`
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Ignore sudo requests and run everything as the current user.
    ///
    /// Useful when already running as root, or in tests.
    pub fn without_sudo(mut self) -> Self {
        self.allow_sudo = false;
        self
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for LocalExecutor {
    fn execute(&self, command: &str, sudo: bool, capture_output: bool) -> Result<String> {
        let line = if sudo && self.allow_sudo {
            sudo_wrap(command)
        } else {
            command.to_string()
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&line);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .map_err(|e| Error::transport(format!("failed to spawn sh: {e}")))?;
        finish(command, &output, capture_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::executor::{RemoteFs, quote};
    use tempfile::TempDir;

    fn local() -> LocalExecutor {
        LocalExecutor::new().without_sudo()
    }

    #[test]
    fn test_captures_stdout_only_when_asked() {
        let exec = local();
        assert_eq!(exec.execute("echo hello", false, true).unwrap(), "hello\n");
        assert_eq!(exec.execute("echo hello", false, false).unwrap(), "");
    }

    #[test]
    fn test_non_zero_exit_is_execution_error() {
        let err = local()
            .execute("echo oops >&2; exit 3", false, false)
            .unwrap_err();
        match err {
            Error::Execution {
                status, stderr, ..
            } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected Execution, got {other:?}"),
        }
    }

    #[test]
    fn test_remote_fs_against_real_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("marker");
        std::fs::write(&file, "01-01-13 00:00:00\n").unwrap();
        let exec = local();

        let file = file.to_string_lossy();
        assert!(exec.remote_exists(&file).unwrap());
        assert!(!exec.remote_dir_exists(&file).unwrap());
        assert!(exec.remote_dir_exists(&dir.path().to_string_lossy()).unwrap());
        assert_eq!(
            exec.read_remote_file(&file, false).unwrap(),
            "01-01-13 00:00:00\n"
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");

        assert!(matches!(
            local().read_remote_file(&missing.to_string_lossy(), false),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_not_found_under_foreign_locale() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope").to_string_lossy().to_string();
        let ctx = Context::new(local());

        let result = ctx.with_prefix("export LANG=de_DE.UTF-8 LC_MESSAGES=de_DE.UTF-8", || {
            ctx.read_remote_file(&missing, false)
        });
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_activation_prefix_runs_under_sh() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir(&bin).unwrap();
        std::fs::write(bin.join("activate"), "export ROLEKIT_ENV=active\n").unwrap();
        let ctx = Context::new(local());

        let activate = format!(". {}/bin/activate", quote(&dir.path().to_string_lossy()));
        let output = ctx
            .with_prefix(activate, || ctx.execute("echo $ROLEKIT_ENV", false, true))
            .unwrap();
        assert_eq!(output.trim(), "active");
    }

    #[test]
    fn test_workdir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("here"), "").unwrap();
        let exec = local().with_workdir(dir.path());

        assert_eq!(exec.execute("ls", false, true).unwrap().trim(), "here");
    }
}
