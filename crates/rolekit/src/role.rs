//! Role trait and lifecycle
//!
//! A Role is a cohesive unit of provisioning behavior. Roles never own the
//! run [`Context`]; every lifecycle step receives it by reference, and a role
//! reaches other roles through [`Context::using`].

use crate::context::Context;
use crate::error::{Error, Result};
use serde::Serialize;
use std::any::Any;

/// Lifecycle of a role within one run.
///
/// ```text
/// Uninitialized --provision--> Provisioned --schedule_cleanup--> CleanupScheduled --cleanup--> Cleaned
///       \________________________schedule_cleanup________________/^
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoleState {
    Uninitialized,
    Provisioned,
    CleanupScheduled,
    Cleaned,
}

impl RoleState {
    /// Whether `self -> to` is a legal step.
    pub fn can_transition(self, to: RoleState) -> bool {
        use RoleState::{CleanupScheduled, Cleaned, Provisioned, Uninitialized};

        matches!(
            (self, to),
            (Uninitialized | Provisioned, Provisioned)
                | (Uninitialized | Provisioned, CleanupScheduled)
                | (CleanupScheduled, Cleaned)
        )
    }

    /// Validate and perform a transition.
    pub fn transition(self, role: &'static str, to: RoleState) -> Result<RoleState> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(Error::Lifecycle {
                role,
                from: self,
                to,
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        self == RoleState::Cleaned
    }
}

/// Upcast helper so registered roles can be handed back as their concrete type.
pub trait AsAny: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Core trait for provisioning roles
///
/// # Example
///
/// ```ignore
/// use rolekit::{Context, Role, Result};
///
/// struct Motd { text: String }
///
/// impl Role for Motd {
///     fn name(&self) -> &'static str { "motd" }
///
///     fn provision(&mut self, ctx: &Context) -> Result<()> {
///         let current = ctx.read_remote_file("/etc/motd", false)?;
///         if current.trim() != self.text {
///             ctx.execute(&format!("echo {} > /etc/motd", rolekit::quote(&self.text)), true, false)?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Role: AsAny {
    /// Short, stable name used in logs and errors
    fn name(&self) -> &'static str;

    /// Perform idempotent setup.
    ///
    /// Running this twice must leave the host as running it once would.
    /// Idempotency comes from probing before every mutation, not from the
    /// role remembering that it already ran.
    fn provision(&mut self, ctx: &Context) -> Result<()>;

    /// Append this role's finishing commands to the context's cleanup ledger.
    ///
    /// Nothing runs here; the ledger is replayed by [`Context::cleanup`].
    fn schedule_cleanup(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// A role that can be constructed on demand when another role borrows it.
pub trait Capability: Role + Sized {
    /// Build a fresh instance for `ctx`.
    fn create(ctx: &Context) -> Result<Self>;
}
