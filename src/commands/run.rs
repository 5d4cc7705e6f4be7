use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use rolekit::transport::{LocalExecutor, RetryConfig, RetryingExecutor, SshExecutor};
use rolekit::{Executor, Run, RunSummary, keys};
use std::collections::BTreeMap;

use crate::Context;
use crate::config::{HostConfig, Inventory, Transport};
use crate::paths;
use crate::roles;
use crate::ui;

/// Apply the configured roles to the selected hosts, one host at a time
pub fn run(ctx: &Context, hosts: &[String], json: bool) -> Result<()> {
    let path = paths::inventory_path(ctx.config.as_deref())?;
    let inventory = Inventory::load(&path)?;
    let selected = inventory.select(hosts)?;

    if selected.is_empty() {
        ui::warn(&format!("No hosts in {}", path.display()));
        return Ok(());
    }

    let show_progress = !ctx.quiet && !json;
    if show_progress {
        ui::header(&format!("Provisioning {}", ui::plural(selected.len(), "host")));
    }

    let total = selected.len();
    let mut summaries = BTreeMap::new();
    for (i, host) in selected.into_iter().enumerate() {
        if show_progress {
            ui::step(
                i + 1,
                total,
                &format!("{} ({})", host.name.bold(), host.address()),
            );
        }

        let summary = provision_host(host)
            .with_context(|| format!("Provisioning '{}' failed", host.name))?;

        if show_progress {
            ui::success(&format!(
                "{}: {} provisioned, {} replayed",
                host.name,
                ui::plural(summary.provisioned, "role"),
                ui::plural(summary.cleanup_commands, "cleanup command")
            ));
        }
        summaries.insert(host.name.clone(), summary);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    }
    Ok(())
}

fn provision_host(host: &HostConfig) -> Result<RunSummary> {
    let run = build_run(host, executor_for(host))?;
    Ok(run.execute()?)
}

/// A run for `host` over `executor`, with every configured role added
fn build_run(host: &HostConfig, executor: impl Executor + 'static) -> rolekit::Result<Run> {
    let ctx = rolekit::Context::new(executor)
        .with_remote_temp_dir(host.remote_temp_dir.clone())
        .with_value(keys::USER, host.user.clone())
        .with_value(keys::HOST, host.name.clone());

    let mut run = Run::new(ctx);
    roles::add_configured(&mut run, host)?;
    Ok(run)
}

fn executor_for(host: &HostConfig) -> Box<dyn Executor> {
    let retry = RetryConfig {
        max_attempts: host.retry_attempts,
        ..RetryConfig::default()
    };

    match host.transport {
        Transport::Local => {
            let mut local = LocalExecutor::new();
            if host.user == "root" {
                local = local.without_sudo();
            }
            Box::new(RetryingExecutor::new(local, retry))
        }
        Transport::Ssh => Box::new(RetryingExecutor::new(ssh_for(host), retry)),
    }
}

fn ssh_for(host: &HostConfig) -> SshExecutor {
    let mut ssh = SshExecutor::new(host.address()).with_user(host.user.clone());
    if let Some(port) = host.port {
        ssh = ssh.with_port(port);
    }
    if let Some(identity) = &host.identity {
        ssh = ssh.with_identity(paths::expand(identity));
    }
    ssh
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolekit::mock::ScriptedExecutor;

    fn host(toml: &str) -> HostConfig {
        Inventory::parse(toml).unwrap().hosts.remove(0)
    }

    #[test]
    fn test_build_run_seeds_context() {
        let host = host(
            r#"
[[hosts]]
name = "web"
user = "deploy"
remote_temp_dir = "/var/tmp"
roles = [{ name = "pip" }]
"#,
        );
        let run = build_run(&host, ScriptedExecutor::new()).unwrap();

        assert_eq!(run.context().get_str(keys::USER).as_deref(), Some("deploy"));
        assert_eq!(run.context().get_str(keys::HOST).as_deref(), Some("web"));
        assert_eq!(run.context().remote_temp_dir(), "/var/tmp");
        assert_eq!(run.role_names(), vec!["pip"]);
    }

    #[test]
    fn test_host_without_roles_runs_clean() {
        let host = host("[[hosts]]\nname = \"idle\"\n");
        let exec = ScriptedExecutor::new();
        let run = build_run(&host, exec.clone()).unwrap();

        let summary = run.execute().unwrap();

        assert_eq!(summary.provisioned, 0);
        assert_eq!(summary.cleanup_commands, 0);
        assert!(exec.commands().is_empty());
    }

    #[test]
    fn test_ssh_for_uses_host_settings() {
        let host = host(
            r#"
[[hosts]]
name = "web"
address = "10.0.0.5"
user = "deploy"
port = 2222
"#,
        );
        let ssh = ssh_for(&host);

        assert_eq!(ssh.destination(), "deploy@10.0.0.5");
        let args = ssh.args("uptime", false);
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert_eq!(args.last().map(String::as_str), Some("uptime"));
    }
}
