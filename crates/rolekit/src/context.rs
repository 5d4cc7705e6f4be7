//! Run context shared by every role
//!
//! One [`Context`] exists per provisioning run. It owns:
//! - the execution facade for the target host
//! - a string-keyed value store (last writer wins)
//! - the ordered cleanup ledger
//! - the role registry behind [`Context::using`]
//!
//! The context uses single-threaded interior mutability and is not `Send`.
//! Runs against different hosts each get their own context.

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::role::{AsAny, Capability, Role, RoleState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Well-known context keys shared across roles.
pub mod keys {
    /// Login user on the target; roles derive per-user directories from it
    pub const USER: &str = "user";
    /// Host name or address the run targets
    pub const HOST: &str = "host";
}

/// Default remote scratch directory.
pub const DEFAULT_REMOTE_TEMP_DIR: &str = "/tmp";

/// A command queued for replay at cleanup time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupCommand {
    pub command: String,
    pub sudo: bool,
}

/// Ordered commands replayed verbatim at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct CleanupLedger {
    commands: Vec<CleanupCommand>,
}

impl CleanupLedger {
    pub fn push(&mut self, command: impl Into<String>, sudo: bool) {
        self.commands.push(CleanupCommand {
            command: command.into(),
            sudo,
        });
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CleanupCommand> {
        self.commands.iter()
    }

    /// Take every command out, leaving the ledger empty
    pub fn drain(&mut self) -> Vec<CleanupCommand> {
        std::mem::take(&mut self.commands)
    }
}

/// A registered role and its lifecycle state.
pub(crate) struct RoleEntry {
    type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) role: RefCell<Box<dyn Role>>,
    pub(crate) state: Cell<RoleState>,
}

impl RoleEntry {
    /// Move to `to`, failing on an illegal step
    pub(crate) fn advance(&self, to: RoleState) -> Result<()> {
        let next = self.state.get().transition(self.name, to)?;
        self.state.set(next);
        Ok(())
    }
}

/// Shared state for one provisioning run.
pub struct Context {
    executor: Box<dyn Executor>,
    remote_temp_dir: String,
    values: RefCell<BTreeMap<String, Value>>,
    ledger: RefCell<CleanupLedger>,
    roles: RefCell<Vec<Rc<RoleEntry>>>,
    prefixes: RefCell<Vec<String>>,
    cleaned: Cell<bool>,
}

impl Context {
    /// Create a context that runs commands through `executor`
    pub fn new(executor: impl Executor + 'static) -> Self {
        Self {
            executor: Box::new(executor),
            remote_temp_dir: DEFAULT_REMOTE_TEMP_DIR.to_string(),
            values: RefCell::new(BTreeMap::new()),
            ledger: RefCell::new(CleanupLedger::default()),
            roles: RefCell::new(Vec::new()),
            prefixes: RefCell::new(Vec::new()),
            cleaned: Cell::new(false),
        }
    }

    /// Use `dir` as the remote scratch directory
    pub fn with_remote_temp_dir(mut self, dir: impl Into<String>) -> Self {
        self.remote_temp_dir = dir.into();
        self
    }

    /// Seed a value before any role runs
    pub fn with_value(self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Stable writable directory on the target for this run
    pub fn remote_temp_dir(&self) -> &str {
        &self.remote_temp_dir
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Store a value; any previous value under `key` is replaced
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.values.borrow_mut().insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.borrow_mut().remove(key)
    }

    /// True only when `key` holds boolean `true`
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.borrow().get(key), Some(Value::Bool(true)))
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.values
            .borrow()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Like [`get_str`](Self::get_str), but a missing key is an error
    pub fn require_str(&self, key: &'static str) -> Result<String> {
        self.get_str(key).ok_or(Error::MissingContextValue(key))
    }

    // =========================================================================
    // Cleanup ledger
    // =========================================================================

    /// Queue a command for replay at cleanup
    pub fn schedule(&self, command: impl Into<String>, sudo: bool) -> Result<()> {
        if self.cleaned.get() {
            return Err(Error::ContextClosed);
        }
        let command = command.into();
        log::debug!("Scheduled cleanup: {command}");
        self.ledger.borrow_mut().push(command, sudo);
        Ok(())
    }

    /// Snapshot of the queued cleanup commands
    pub fn ledger(&self) -> Vec<CleanupCommand> {
        self.ledger.borrow().iter().cloned().collect()
    }

    /// Replay the ledger in insertion order, then leave it empty.
    ///
    /// The ledger is drained before replay starts, so a failing command stops
    /// the replay and the remaining commands are discarded. Afterwards the
    /// context is closed: nothing more can be scheduled or provisioned.
    /// Returns the number of commands run.
    pub fn cleanup(&self) -> Result<usize> {
        self.cleaned.set(true);
        let commands = self.ledger.borrow_mut().drain();
        if commands.is_empty() {
            return Ok(0);
        }

        log::info!("Running {} cleanup command(s)", commands.len());
        for entry in &commands {
            self.execute(&entry.command, entry.sudo, false)?;
        }
        Ok(commands.len())
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned.get()
    }

    // =========================================================================
    // Role registry
    // =========================================================================

    /// Register `role` as the instance for its type.
    ///
    /// At most one instance per role type lives in a context.
    pub fn register<R: Role>(&self, role: R) -> Result<()> {
        self.insert(role).map(|_| ())
    }

    fn insert<R: Role>(&self, role: R) -> Result<Rc<RoleEntry>> {
        if self.cleaned.get() {
            return Err(Error::ContextClosed);
        }
        let name = role.name();
        if self.lookup(TypeId::of::<R>()).is_some() {
            return Err(Error::CapabilityConflict(name));
        }

        log::debug!("Registered role {name}");
        let entry = Rc::new(RoleEntry {
            type_id: TypeId::of::<R>(),
            name,
            role: RefCell::new(Box::new(role)),
            state: Cell::new(RoleState::Uninitialized),
        });
        self.roles.borrow_mut().push(Rc::clone(&entry));
        Ok(entry)
    }

    fn lookup(&self, type_id: TypeId) -> Option<Rc<RoleEntry>> {
        self.roles
            .borrow()
            .iter()
            .find(|e| e.type_id == type_id)
            .cloned()
    }

    /// Whether an instance of `R` is registered
    pub fn has_role<R: Role>(&self) -> bool {
        self.lookup(TypeId::of::<R>()).is_some()
    }

    /// Borrow the instance of `R` for the duration of `f`.
    ///
    /// The registered instance is used when there is one; otherwise a new one
    /// is built with [`Capability::create`] and registered, so every later
    /// caller in this run sees the same instance and its accumulated state.
    /// Borrowing a role that is already borrowed further up the stack fails
    /// with [`Error::CapabilityInUse`].
    pub fn using<R, T, F>(&self, f: F) -> Result<T>
    where
        R: Capability,
        F: FnOnce(&mut R) -> Result<T>,
    {
        let entry = match self.lookup(TypeId::of::<R>()) {
            Some(entry) => entry,
            None => {
                let role = R::create(self)?;
                self.insert(role)?
            }
        };

        let mut guard = entry
            .role
            .try_borrow_mut()
            .map_err(|_| Error::CapabilityInUse(entry.name))?;
        let role: &mut dyn Role = &mut **guard;
        let role = AsAny::as_any_mut(role)
            .downcast_mut::<R>()
            .ok_or(Error::CapabilityConflict(entry.name))?;
        f(role)
    }

    /// Lifecycle state of every registered role, in registration order
    pub fn role_states(&self) -> Vec<(&'static str, RoleState)> {
        self.roles
            .borrow()
            .iter()
            .map(|e| (e.name, e.state.get()))
            .collect()
    }

    pub(crate) fn entries(&self) -> Vec<Rc<RoleEntry>> {
        self.roles.borrow().clone()
    }

    pub(crate) fn entry_for<R: Role>(&self) -> Option<Rc<RoleEntry>> {
        self.lookup(TypeId::of::<R>())
    }

    // =========================================================================
    // Command prefixes
    // =========================================================================

    /// Run `f` with `prefix` prepended (joined by `&&`) to every command.
    ///
    /// Prefixes nest; the outermost comes first.
    pub fn with_prefix<T>(&self, prefix: impl Into<String>, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.prefixes.borrow_mut().push(prefix.into());
        let result = f();
        self.prefixes.borrow_mut().pop();
        result
    }

    fn prefixed(&self, command: &str) -> String {
        let prefixes = self.prefixes.borrow();
        if prefixes.is_empty() {
            command.to_string()
        } else {
            format!("{} && {}", prefixes.join(" && "), command)
        }
    }
}

impl Executor for Context {
    fn execute(&self, command: &str, sudo: bool, capture_output: bool) -> Result<String> {
        let command = self.prefixed(command);
        log::debug!("{}$ {}", if sudo { "sudo " } else { "" }, command);
        self.executor.execute(&command, sudo, capture_output)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("remote_temp_dir", &self.remote_temp_dir)
            .field("values", &self.values.borrow())
            .field("ledger", &self.ledger.borrow().len())
            .field("roles", &self.role_states())
            .field("cleaned", &self.cleaned.get())
            .finish()
    }
}
