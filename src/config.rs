//! Inventory file: hosts and the roles applied to each
//!
//! ```toml
//! [[hosts]]
//! name = "web1"
//! address = "10.0.0.5"
//! user = "deploy"
//!
//! [[hosts.roles]]
//! name = "aptitude"
//! packages = ["nginx"]
//!
//! [[hosts.roles]]
//! name = "iptables"
//! allow = [{ port = 80 }, { port = 443 }]
//! ```

use crate::roles::iptables::RuleSpec;
use crate::roles::pip::PackageSpec;
use crate::roles::virtualenv::EnvSpec;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Every host provisor knows about
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

/// How commands reach a host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Ssh,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,
    /// Address to connect to; defaults to the name
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub transport: Transport,
    /// ssh private key
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default = "default_remote_temp_dir")]
    pub remote_temp_dir: String,
    /// Connection attempts before giving up
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Minimum minutes between two package index refreshes
    #[serde(default = "default_update_interval")]
    pub update_interval_minutes: i64,
    /// Roles to apply, in order
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_remote_temp_dir() -> String {
    rolekit::context::DEFAULT_REMOTE_TEMP_DIR.to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_update_interval() -> i64 {
    rolekit::throttle::DEFAULT_INTERVAL_MINUTES
}

impl HostConfig {
    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.name)
    }
}

/// One role table, tagged by `name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum RoleConfig {
    Aptitude(PackageRoleConfig),
    Yum(PackageRoleConfig),
    Pip(PipConfig),
    Virtualenv(VirtualenvConfig),
    Iptables(FirewallConfig),
}

impl RoleConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aptitude(_) => "aptitude",
            Self::Yum(_) => "yum",
            Self::Pip(_) => "pip",
            Self::Virtualenv(_) => "virtualenv",
            Self::Iptables(_) => "iptables",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageRoleConfig {
    pub packages: Vec<String>,
    pub sources: Vec<String>,
    pub gpg_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipConfig {
    pub packages: Vec<PackageSpec>,
    pub requirements: Vec<String>,
    pub sudo: bool,
}

impl Default for PipConfig {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            requirements: Vec::new(),
            sudo: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualenvConfig {
    pub envs: Vec<EnvSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    pub block_on_finish: bool,
    pub ssh_port: u16,
    pub allow: Vec<RuleSpec>,
    pub reject: Vec<RuleSpec>,
    pub drop: Vec<RuleSpec>,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            block_on_finish: true,
            ssh_port: 22,
            allow: Vec::new(),
            reject: Vec::new(),
            drop: Vec::new(),
        }
    }
}

impl Inventory {
    /// Load and validate an inventory file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid inventory {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let inventory: Self = toml::from_str(content)?;
        inventory.validate()?;
        Ok(inventory)
    }

    fn validate(&self) -> Result<()> {
        let mut hosts = BTreeSet::new();
        for host in &self.hosts {
            if !hosts.insert(host.name.as_str()) {
                bail!("host '{}' is listed twice", host.name);
            }

            let mut roles = BTreeSet::new();
            for role in &host.roles {
                if !roles.insert(role.name()) {
                    bail!("host '{}' lists role '{}' twice", host.name, role.name());
                }
            }

            if host.update_interval_minutes < 0 {
                bail!("host '{}': update_interval_minutes cannot be negative", host.name);
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&HostConfig> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// Hosts named in `names`, in that order; every host when empty
    pub fn select(&self, names: &[String]) -> Result<Vec<&HostConfig>> {
        if names.is_empty() {
            return Ok(self.hosts.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.find(name)
                    .with_context(|| format!("Unknown host '{name}'"))
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
