//! # rolekit
//!
//! Building blocks for role-based host provisioning.
//!
//! This crate provides:
//! - A per-run [`Context`]: execution facade, key/value store, cleanup
//!   ledger and role registry
//! - The [`Role`] lifecycle (provision, schedule cleanup, cleanup)
//! - Capability borrowing through [`Context::using`], so roles share one
//!   instance per type within a run
//! - Probe-then-mutate helpers for idempotent steps
//! - An [`UpdateThrottler`] that gates slow refreshes behind a remote
//!   timestamp marker
//! - Local and ssh transports with retry on connection failures
//!
//! ## Example
//!
//! ```no_run
//! use rolekit::{Context, Executor, Result, Role, Run};
//! use rolekit::transport::LocalExecutor;
//!
//! struct Hostname(String);
//!
//! impl Role for Hostname {
//!     fn name(&self) -> &'static str { "hostname" }
//!
//!     fn provision(&mut self, ctx: &Context) -> Result<()> {
//!         rolekit::ensure(
//!             || Ok(ctx.execute("hostname", false, true)?.trim() == self.0),
//!             || ctx.execute(&format!("hostname {}", rolekit::quote(&self.0)), true, false).map(|_| ()),
//!         )?;
//!         Ok(())
//!     }
//! }
//!
//! let mut run = Run::new(Context::new(LocalExecutor::new()));
//! run.add(Hostname("build-01".into())).unwrap();
//! let summary = run.execute().unwrap();
//! println!("{} role(s) provisioned", summary.provisioned);
//! ```

pub mod clock;
pub mod context;
pub mod error;
pub mod executor;
pub mod idempotency;
pub mod mock;
pub mod role;
pub mod runner;
pub mod throttle;
pub mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{CleanupCommand, CleanupLedger, Context, keys};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{Executor, RemoteFs, quote};
pub use idempotency::{LineFile, Listing, ensure};
pub use role::{Capability, Role, RoleState};
pub use runner::{Run, RunSummary};
pub use throttle::UpdateThrottler;
