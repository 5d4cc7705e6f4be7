use anyhow::{Result, bail};
use colored::Colorize;

use crate::Context;
use crate::config::{HostConfig, Inventory, RoleConfig, Transport};
use crate::paths;
use crate::ui;

/// Print the inventory, or one host of it
pub fn run(ctx: &Context, host: Option<&str>, json: bool) -> Result<()> {
    let path = paths::inventory_path(ctx.config.as_deref())?;
    let inventory = Inventory::load(&path)?;

    let hosts: Vec<&HostConfig> = match host {
        Some(name) => match inventory.find(name) {
            Some(h) => vec![h],
            None => bail!("Unknown host '{name}'"),
        },
        None => inventory.hosts.iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&hosts)?);
        return Ok(());
    }

    if hosts.is_empty() {
        ui::info(&format!("No hosts in {}", path.display()));
        return Ok(());
    }

    ui::header(&format!("Inventory: {}", path.display()));
    for host in hosts {
        print_host(host, ctx.verbose > 0);
    }
    Ok(())
}

fn print_host(host: &HostConfig, detailed: bool) {
    ui::section(&host.name);
    ui::kv("address", host.address());
    ui::kv("user", &host.user);
    ui::kv("transport", &transport_label(host));
    if detailed {
        ui::kv("temp dir", &host.remote_temp_dir);
        ui::kv("retries", &host.retry_attempts.to_string());
        ui::kv(
            "update interval",
            &format!("{} min", host.update_interval_minutes),
        );
    }

    if host.roles.is_empty() {
        ui::dim("no roles");
        return;
    }
    for role in &host.roles {
        println!("  {} {}", "•".cyan(), role_summary(role));
    }
}

fn transport_label(host: &HostConfig) -> String {
    match host.transport {
        Transport::Local => "local".to_string(),
        Transport::Ssh => match host.port {
            Some(port) => format!("ssh (port {port})"),
            None => "ssh".to_string(),
        },
    }
}

fn role_summary(role: &RoleConfig) -> String {
    let detail = match role {
        RoleConfig::Aptitude(cfg) | RoleConfig::Yum(cfg) => {
            let mut parts = vec![ui::plural(cfg.packages.len(), "package")];
            if !cfg.sources.is_empty() {
                parts.push(ui::plural(cfg.sources.len(), "source"));
            }
            parts.join(", ")
        }
        RoleConfig::Pip(cfg) => {
            let sudo = if cfg.sudo { "" } else { ", no sudo" };
            format!("{}{sudo}", ui::plural(cfg.packages.len(), "package"))
        }
        RoleConfig::Virtualenv(cfg) => {
            let names: Vec<&str> = cfg.envs.iter().map(|e| e.name.as_str()).collect();
            if names.is_empty() {
                "tools only".to_string()
            } else {
                names.join(", ")
            }
        }
        RoleConfig::Iptables(cfg) => {
            let rules = cfg.allow.len() + cfg.reject.len() + cfg.drop.len();
            let finish = if cfg.block_on_finish {
                "blocks on finish"
            } else {
                "open on finish"
            };
            format!("{}, {finish}", ui::plural(rules, "rule"))
        }
    };
    format!("{} {}", role.name().bold(), format!("({detail})").dimmed())
}
