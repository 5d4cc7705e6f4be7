//! Remote executor over the system `ssh` client

use super::{finish, sudo_wrap};
use crate::error::{Error, Result};
use crate::executor::Executor;
use std::path::PathBuf;
use std::process::Command;

/// ssh exits with this status when the connection itself failed
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Runs commands on a remote host through `ssh`.
///
/// Authentication is non-interactive (`BatchMode=yes`); keys or an agent
/// must already be set up.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    host: String,
    user: Option<String>,
    port: Option<u16>,
    identity: Option<PathBuf>,
    connect_timeout: u32,
}

impl SshExecutor {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            identity: None,
            connect_timeout: 10,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_identity(mut self, identity: impl Into<PathBuf>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Seconds to wait for the connection
    pub fn with_connect_timeout(mut self, seconds: u32) -> Self {
        self.connect_timeout = seconds;
        self
    }

    /// `user@host`, or just the host
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// Arguments passed to `ssh` for one command line
    pub fn args(&self, command: &str, sudo: bool) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
        ];
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.identity {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().to_string());
        }
        args.push(self.destination());
        args.push(if sudo {
            sudo_wrap(command)
        } else {
            command.to_string()
        });
        args
    }
}

impl Executor for SshExecutor {
    fn execute(&self, command: &str, sudo: bool, capture_output: bool) -> Result<String> {
        let output = Command::new("ssh")
            .args(self.args(command, sudo))
            .output()
            .map_err(|e| Error::transport(format!("failed to spawn ssh: {e}")))?;

        if output.status.code() == Some(SSH_CONNECTION_FAILURE) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::transport(format!(
                "{}: {}",
                self.destination(),
                stderr.trim()
            )));
        }

        finish(command, &output, capture_output)
    }
}
