//! Run driver - walks roles through their lifecycle against one context

use crate::context::{Context, RoleEntry};
use crate::error::Result;
use crate::role::{Role, RoleState};
use serde::Serialize;
use std::rc::Rc;

/// Counts from a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Top-level roles provisioned
    pub provisioned: usize,
    /// Roles (top-level and borrowed) that scheduled their cleanup
    pub scheduled: usize,
    /// Cleanup commands replayed
    pub cleanup_commands: usize,
}

/// One provisioning run: a context plus the roles it was asked to apply.
///
/// Top-level roles are registered in the context as they are added, so a
/// role borrowing the same type through [`Context::using`] gets the
/// configured instance.
pub struct Run {
    ctx: Context,
    roles: Vec<Rc<RoleEntry>>,
}

impl Run {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            roles: Vec::new(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Add a top-level role; provisioned in insertion order
    pub fn add<R: Role>(&mut self, role: R) -> Result<&mut Self> {
        self.ctx.register(role)?;
        if let Some(entry) = self.ctx.entry_for::<R>() {
            self.roles.push(entry);
        }
        Ok(self)
    }

    /// Names of the top-level roles
    pub fn role_names(&self) -> Vec<&'static str> {
        self.roles.iter().map(|e| e.name).collect()
    }

    /// Provision every top-level role, in order, stopping at the first failure
    pub fn provision(&self) -> Result<usize> {
        for entry in &self.roles {
            log::info!("Provisioning {}", entry.name);
            let mut role = entry.role.borrow_mut();
            entry.state.get().transition(entry.name, RoleState::Provisioned)?;
            role.provision(&self.ctx)?;
            entry.advance(RoleState::Provisioned)?;
        }
        Ok(self.roles.len())
    }

    /// Let every registered role queue its cleanup commands, once each.
    ///
    /// Roles created on demand by `using` are included, after the roles
    /// registered before them.
    pub fn schedule_cleanup(&self) -> Result<usize> {
        let mut scheduled = 0;
        for entry in self.ctx.entries() {
            if entry.state.get() == RoleState::CleanupScheduled {
                continue;
            }
            entry
                .state
                .get()
                .transition(entry.name, RoleState::CleanupScheduled)?;
            entry.role.borrow_mut().schedule_cleanup(&self.ctx)?;
            entry.advance(RoleState::CleanupScheduled)?;
            scheduled += 1;
        }
        Ok(scheduled)
    }

    /// Replay the cleanup ledger and close the context
    pub fn cleanup(&self) -> Result<usize> {
        let replayed = self.ctx.cleanup()?;
        for entry in self.ctx.entries() {
            if entry.state.get() == RoleState::CleanupScheduled {
                entry.advance(RoleState::Cleaned)?;
            }
        }
        Ok(replayed)
    }

    /// Provision, schedule cleanup, then clean up.
    ///
    /// A provisioning failure aborts the run before anything is scheduled.
    pub fn execute(self) -> Result<RunSummary> {
        let provisioned = self.provision()?;
        let scheduled = self.schedule_cleanup()?;
        let cleanup_commands = self.cleanup()?;

        Ok(RunSummary {
            provisioned,
            scheduled,
            cleanup_commands,
        })
    }
}
