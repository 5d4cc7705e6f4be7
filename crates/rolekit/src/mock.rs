//! Scripted executor for tests
//!
//! Records every call and answers from a script keyed on the exact command
//! line. Unscripted commands succeed with empty output. Clones share state,
//! so a test can hand one clone to a [`Context`](crate::Context) and inspect
//! the other.

use crate::error::{Error, Result};
use crate::executor::Executor;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub command: String,
    pub sudo: bool,
    pub capture_output: bool,
}

impl Call {
    pub fn new(command: &str, sudo: bool, capture_output: bool) -> Self {
        Self {
            command: command.to_string(),
            sudo,
            capture_output,
        }
    }
}

enum Response {
    Output(String),
    Failure(Error),
}

impl Response {
    fn replay(&self) -> Result<String> {
        match self {
            Response::Output(out) => Ok(out.clone()),
            Response::Failure(err) => Err(clone_error(err)),
        }
    }
}

// Only the variants a transport produces need to be scriptable.
fn clone_error(err: &Error) -> Error {
    match err {
        Error::Transport { message } => Error::transport(message.clone()),
        Error::Execution {
            command,
            status,
            stderr,
        } => Error::Execution {
            command: command.clone(),
            status: *status,
            stderr: stderr.clone(),
        },
        Error::NotFound { path } => Error::NotFound { path: path.clone() },
        other => Error::transport(other.to_string()),
    }
}

#[derive(Default)]
struct Script {
    // Successive responses; the last one repeats.
    responses: HashMap<String, VecDeque<Response>>,
    calls: Vec<Call>,
}

/// Executor test double.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    inner: Rc<RefCell<Script>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `output`
    pub fn on(&self, command: &str, output: &str) -> &Self {
        self.push(command, Response::Output(output.to_string()))
    }

    /// Answer successive calls of `command` with `outputs` in order; the last
    /// output keeps answering once the others are used up
    pub fn on_each(&self, command: &str, outputs: &[&str]) -> &Self {
        for output in outputs {
            self.on(command, output);
        }
        self
    }

    /// Make `command` exit with `status` and `stderr`
    pub fn fail(&self, command: &str, status: i32, stderr: &str) -> &Self {
        self.push(
            command,
            Response::Failure(Error::execution(command, Some(status), stderr)),
        )
    }

    /// Make `command` fail with an arbitrary error
    pub fn fail_with(&self, command: &str, error: Error) -> &Self {
        self.push(command, Response::Failure(error))
    }

    fn push(&self, command: &str, response: Response) -> &Self {
        self.inner
            .borrow_mut()
            .responses
            .entry(command.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.inner.borrow().calls.clone()
    }

    /// Every command line so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.inner
            .borrow()
            .calls
            .iter()
            .map(|c| c.command.clone())
            .collect()
    }

    /// Calls that did not capture output (mutations and cleanup replays)
    pub fn writes(&self) -> Vec<Call> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter(|c| !c.capture_output)
            .cloned()
            .collect()
    }

    /// Whether `command` was executed at least once
    pub fn ran(&self, command: &str) -> bool {
        self.inner.borrow().calls.iter().any(|c| c.command == command)
    }

    pub fn clear_calls(&self) {
        self.inner.borrow_mut().calls.clear();
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, command: &str, sudo: bool, capture_output: bool) -> Result<String> {
        let mut script = self.inner.borrow_mut();
        script.calls.push(Call::new(command, sudo, capture_output));

        let result = match script.responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => {
                let response = queue.pop_front();
                response.map_or(Ok(String::new()), |r| r.replay())
            }
            Some(queue) => queue.front().map_or(Ok(String::new()), Response::replay),
            None => Ok(String::new()),
        };

        match result {
            Ok(_) if !capture_output => Ok(String::new()),
            other => other,
        }
    }
}
