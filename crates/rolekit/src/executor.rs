//! Execution facade and remote state accessors
//!
//! Every remote interaction goes through [`Executor::execute`]. The
//! accessors in [`RemoteFs`] are built on it, so any executor (real
//! transport, test double, or the run [`Context`](crate::Context)) gets them
//! for free.

use crate::error::{Error, Result};

/// Runs commands on the target host.
///
/// Implement this trait to provide a transport. The implementation blocks
/// until the remote command completes.
pub trait Executor {
    /// Run `command` on the target.
    ///
    /// # Arguments
    /// * `command` - Shell command line
    /// * `sudo` - Run with elevated privileges
    /// * `capture_output` - Return stdout; when false the result is empty
    ///
    /// # Errors
    /// [`Error::Execution`] when the command exits non-zero,
    /// [`Error::Transport`] when it could not be dispatched.
    fn execute(&self, command: &str, sudo: bool, capture_output: bool) -> Result<String>;
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn execute(&self, command: &str, sudo: bool, capture_output: bool) -> Result<String> {
        (**self).execute(command, sudo, capture_output)
    }
}

const EXISTS_MARKER: &str = "exists";

/// Read-only accessors for remote paths.
pub trait RemoteFs {
    /// Whether anything exists at `path`.
    ///
    /// Absence is `Ok(false)`; only transport or shell failures are errors.
    fn remote_exists(&self, path: &str) -> Result<bool>;

    /// Whether a directory exists at `path`.
    fn remote_dir_exists(&self, path: &str) -> Result<bool>;

    /// Read the full content of a remote file.
    ///
    /// Callers are expected to check [`remote_exists`](Self::remote_exists)
    /// first; a missing file is [`Error::NotFound`]. `cat` runs under the C
    /// locale so its missing-file message can be recognized.
    fn read_remote_file(&self, path: &str, sudo: bool) -> Result<String>;
}

impl<E: Executor + ?Sized> RemoteFs for E {
    fn remote_exists(&self, path: &str) -> Result<bool> {
        probe_test(self, "-e", path)
    }

    fn remote_dir_exists(&self, path: &str) -> Result<bool> {
        probe_test(self, "-d", path)
    }

    fn read_remote_file(&self, path: &str, sudo: bool) -> Result<String> {
        match self.execute(&format!("LC_ALL=C cat {}", quote(path)), sudo, true) {
            Err(Error::Execution { stderr, .. }) if stderr.contains("No such file") => {
                Err(Error::NotFound {
                    path: path.to_string(),
                })
            }
            other => other,
        }
    }
}

/// `test` always succeeds here so absence never surfaces as an error
fn probe_test<E: Executor + ?Sized>(executor: &E, flag: &str, path: &str) -> Result<bool> {
    let command = format!(
        "test {flag} {} && echo {EXISTS_MARKER} || echo missing",
        quote(path)
    );
    let output = executor.execute(&command, false, true)?;
    Ok(output.trim() == EXISTS_MARKER)
}

/// Quote a value for the remote shell.
pub fn quote(value: &str) -> String {
    shell_words::quote(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedExecutor;

    #[test]
    fn test_remote_exists() {
        let exec = ScriptedExecutor::new();
        exec.on("test -e /etc/hosts && echo exists || echo missing", "exists\n");

        assert!(exec.remote_exists("/etc/hosts").unwrap());
        assert!(!exec.remote_exists("/nope").unwrap());
    }

    #[test]
    fn test_remote_exists_propagates_transport_failure() {
        let exec = ScriptedExecutor::new();
        exec.fail_with(
            "test -e /etc/hosts && echo exists || echo missing",
            Error::transport("connection refused"),
        );

        assert!(matches!(
            exec.remote_exists("/etc/hosts"),
            Err(Error::Transport { .. })
        ));
    }

    #[test]
    fn test_read_remote_file_not_found() {
        let exec = ScriptedExecutor::new();
        exec.fail("LC_ALL=C cat /missing", 1, "cat: /missing: No such file or directory");

        match exec.read_remote_file("/missing", false) {
            Err(Error::NotFound { path }) => assert_eq!(path, "/missing"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_read_remote_file_other_failure_is_execution() {
        let exec = ScriptedExecutor::new();
        exec.fail("LC_ALL=C cat /root/secret", 1, "cat: /root/secret: Permission denied");

        assert!(matches!(
            exec.read_remote_file("/root/secret", false),
            Err(Error::Execution { .. })
        ));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("/tmp/plain"), "/tmp/plain");
        assert_eq!(quote("with space"), "'with space'");
    }
}
