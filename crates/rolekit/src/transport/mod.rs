//! Concrete executors
//!
//! - [`LocalExecutor`] runs commands through `sh -c` on this machine
//! - [`SshExecutor`] runs them on a remote host through the system `ssh`
//! - [`RetryingExecutor`] wraps either and retries transport failures

mod local;
mod retry;
mod ssh;

pub use local::LocalExecutor;
pub use retry::{RetryConfig, RetryingExecutor};
pub use ssh::SshExecutor;

use crate::error::{Error, Result};
use std::process::Output;

/// Turn a finished process into the executor contract.
fn finish(command: &str, output: &Output, capture_output: bool) -> Result<String> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::execution(command, output.status.code(), &stderr));
    }

    if capture_output {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Ok(String::new())
    }
}

/// Wrap a command line so it runs under `sudo` without prompting
fn sudo_wrap(command: &str) -> String {
    format!("sudo -n sh -c {}", crate::executor::quote(command))
}
