//! Firewall management with iptables
//!
//! Provisioning opens the ssh port at the head of the INPUT chain before any
//! other rule is touched, so the operator keeps access for the rest of the
//! run. The closing deny-all rule is only appended by cleanup, after the
//! rule set has been saved. On a host provisioned before, rules added later
//! are inserted ahead of that deny-all so they still match.

use super::aptitude::Aptitude;
use rolekit::{Capability, Context, Executor, Listing, Result, Role, ensure, quote};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where saved rules are written at cleanup
pub const RULES_FILE: &str = "/etc/iptables.rules";

const DEFAULT_SSH_PORT: u16 = 22;

/// Cleanup command closing INPUT, a no-op when the rule is already there
pub const BLOCK_COMMAND: &str = "iptables -C INPUT -j DROP || iptables -A INPUT -j DROP";

/// Chain a rule applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    In,
    Out,
    Forward,
}

impl Direction {
    pub fn chain(self) -> &'static str {
        match self {
            Self::In => "INPUT",
            Self::Out => "OUTPUT",
            Self::Forward => "FORWARD",
        }
    }
}

/// Rule target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Accept,
    Reject,
    Drop,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accept => "ACCEPT",
            Self::Reject => "REJECT",
            Self::Drop => "DROP",
        })
    }
}

/// Match part of a rule.
///
/// Addresses should be written in CIDR form (`10.0.0.1/32`) so they compare
/// equal to what `iptables-save` prints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSpec {
    pub port: Option<u16>,
    /// Defaults to `tcp` when a port is given
    pub protocol: Option<String>,
    pub direction: Direction,
    pub source: Option<String>,
    pub destination: Option<String>,
    /// Match module; defaults to the protocol when a port is given
    #[serde(rename = "match")]
    pub match_module: Option<String>,
}

impl RuleSpec {
    pub fn port(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Self::default()
        }
    }

    /// Rule body in `iptables-save` order, e.g.
    /// `-A INPUT -p tcp -m tcp --dport 22 -j ACCEPT`
    pub fn fragment(&self, policy: Policy) -> String {
        let mut parts = vec![format!("-A {}", self.direction.chain())];
        if let Some(source) = &self.source {
            parts.push(format!("-s {}", quote(source)));
        }
        if let Some(destination) = &self.destination {
            parts.push(format!("-d {}", quote(destination)));
        }

        let protocol = self
            .protocol
            .clone()
            .or_else(|| self.port.map(|_| "tcp".to_string()));
        if let Some(protocol) = &protocol {
            parts.push(format!("-p {}", quote(protocol)));
        }
        let match_module = self
            .match_module
            .clone()
            .or_else(|| self.port.and(protocol.clone()));
        if let Some(module) = &match_module {
            parts.push(format!("-m {}", quote(module)));
        }
        if let Some(port) = self.port {
            parts.push(format!("--dport {port}"));
        }

        parts.push(format!("-j {policy}"));
        parts.join(" ")
    }
}

/// Firewall role.
pub struct IpTables {
    block_on_finish: bool,
    ssh_port: u16,
    allowed: Vec<RuleSpec>,
    rejected: Vec<RuleSpec>,
    dropped: Vec<RuleSpec>,
}

impl Default for IpTables {
    fn default() -> Self {
        Self {
            block_on_finish: true,
            ssh_port: DEFAULT_SSH_PORT,
            allowed: Vec::new(),
            rejected: Vec::new(),
            dropped: Vec::new(),
        }
    }
}

impl IpTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cleanup appends a final deny-all on INPUT (default on)
    pub fn with_block_on_finish(mut self, block: bool) -> Self {
        self.block_on_finish = block;
        self
    }

    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    pub fn with_rules(
        mut self,
        allowed: Vec<RuleSpec>,
        rejected: Vec<RuleSpec>,
        dropped: Vec<RuleSpec>,
    ) -> Self {
        self.allowed = allowed;
        self.rejected = rejected;
        self.dropped = dropped;
        self
    }

    pub fn block_on_finish(&self) -> bool {
        self.block_on_finish
    }

    /// `iptables -L`
    pub fn list_rules(&self, ctx: &Context) -> Result<String> {
        ctx.execute("iptables -L", true, true)
    }

    /// `iptables-save`: every rule as the command that creates it
    pub fn list_rules_with_commands(&self, ctx: &Context) -> Result<String> {
        ctx.execute("iptables-save", true, true)
    }

    /// Whether a line of `iptables-save` contains `fragment`
    pub fn has_rule(&self, ctx: &Context, fragment: &str) -> Result<bool> {
        Ok(Listing::parse(&self.list_rules_with_commands(ctx)?).contains(fragment))
    }

    pub fn allow(&self, ctx: &Context, spec: &RuleSpec) -> Result<bool> {
        self.append_rule(ctx, spec, Policy::Accept)
    }

    pub fn reject(&self, ctx: &Context, spec: &RuleSpec) -> Result<bool> {
        self.append_rule(ctx, spec, Policy::Reject)
    }

    pub fn drop(&self, ctx: &Context, spec: &RuleSpec) -> Result<bool> {
        self.append_rule(ctx, spec, Policy::Drop)
    }

    fn append_rule(&self, ctx: &Context, spec: &RuleSpec, policy: Policy) -> Result<bool> {
        let fragment = spec.fragment(policy);
        let chain = spec.direction.chain();
        ensure(
            || self.has_rule(ctx, &fragment),
            || {
                let saved = self.list_rules_with_commands(ctx)?;
                let rule = match deny_all_position(&saved, chain) {
                    Some(position) => fragment.replacen(
                        &format!("-A {chain}"),
                        &format!("-I {chain} {position}"),
                        1,
                    ),
                    None => fragment.clone(),
                };
                log::info!("Adding firewall rule: {rule}");
                ctx.execute(&format!("iptables {rule}"), true, false)
                    .map(|_| ())
            },
        )
    }

    /// Insert the ssh accept rule at the head of INPUT unless present
    pub fn ensure_ssh_allowed(&self, ctx: &Context) -> Result<bool> {
        let fragment = RuleSpec::port(self.ssh_port).fragment(Policy::Accept);
        ensure(
            || self.has_rule(ctx, &fragment),
            || {
                let insert = fragment.replacen("-A INPUT", "-I INPUT 1", 1);
                log::info!("Allowing ssh on port {}", self.ssh_port);
                ctx.execute(&format!("iptables {insert}"), true, false)
                    .map(|_| ())
            },
        )
    }
}

/// Rule number of the first unconditional DROP in `chain`, counted from 1
fn deny_all_position(saved: &str, chain: &str) -> Option<usize> {
    let append = format!("-A {chain} ");
    let deny_all = format!("-A {chain} -j DROP");
    Listing::parse(saved)
        .lines()
        .filter(|line| line.starts_with(&append))
        .position(|line| line == deny_all)
        .map(|index| index + 1)
}

impl Role for IpTables {
    fn name(&self) -> &'static str {
        "iptables"
    }

    fn provision(&mut self, ctx: &Context) -> Result<()> {
        ctx.using(|aptitude: &mut Aptitude| aptitude.ensure_package_installed(ctx, "iptables"))?;
        self.ensure_ssh_allowed(ctx)?;

        for spec in &self.allowed {
            self.allow(ctx, spec)?;
        }
        for spec in &self.rejected {
            self.reject(ctx, spec)?;
        }
        for spec in &self.dropped {
            self.drop(ctx, spec)?;
        }
        Ok(())
    }

    fn schedule_cleanup(&mut self, ctx: &Context) -> Result<()> {
        ctx.schedule(format!("iptables-save > {RULES_FILE}"), true)?;
        if self.block_on_finish {
            ctx.schedule(BLOCK_COMMAND, true)?;
        }
        Ok(())
    }
}

impl Capability for IpTables {
    fn create(_ctx: &Context) -> Result<Self> {
        Ok(Self::new())
    }
}
