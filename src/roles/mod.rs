//! Concrete roles and their construction from the inventory

#![allow(dead_code)]

pub mod aptitude;
pub mod iptables;
pub mod package;
pub mod pip;
pub mod virtualenv;
pub mod yum;

use crate::config::{HostConfig, PackageRoleConfig, RoleConfig};
use aptitude::Aptitude;
use chrono::TimeDelta;
use iptables::IpTables;
use package::{PackageFamily, PackageManager};
use pip::Pip;
use rolekit::Run;
use virtualenv::Virtualenv;
use yum::Yum;

fn package_role<F: PackageFamily>(cfg: &PackageRoleConfig, interval: TimeDelta) -> PackageManager<F> {
    PackageManager::<F>::new()
        .with_packages(cfg.packages.clone())
        .with_sources(cfg.sources.clone())
        .with_gpg_keys(cfg.gpg_keys.clone())
        .with_interval(interval)
}

/// Add every role configured for `host` to `run`, in inventory order
pub fn add_configured(run: &mut Run, host: &HostConfig) -> rolekit::Result<()> {
    let interval = TimeDelta::minutes(host.update_interval_minutes);

    for role in &host.roles {
        match role {
            RoleConfig::Aptitude(cfg) => {
                let role: Aptitude = package_role(cfg, interval);
                run.add(role)?;
            }
            RoleConfig::Yum(cfg) => {
                let role: Yum = package_role(cfg, interval);
                run.add(role)?;
            }
            RoleConfig::Pip(cfg) => {
                let mut pip = Pip::new()
                    .with_packages(cfg.packages.clone())
                    .with_requirements(cfg.requirements.clone());
                pip.set_sudo(cfg.sudo);
                run.add(pip)?;
            }
            RoleConfig::Virtualenv(cfg) => {
                run.add(Virtualenv::new().with_envs(cfg.envs.clone()))?;
            }
            RoleConfig::Iptables(cfg) => {
                run.add(
                    IpTables::new()
                        .with_block_on_finish(cfg.block_on_finish)
                        .with_ssh_port(cfg.ssh_port)
                        .with_rules(cfg.allow.clone(), cfg.reject.clone(), cfg.drop.clone()),
                )?;
            }
        }
    }

    // Aptitude borrowed by other roles follows the host's refresh interval too.
    if !run.context().has_role::<Aptitude>() {
        run.context()
            .register(Aptitude::new().with_interval(interval))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Inventory;
    use rolekit::Context;
    use rolekit::mock::ScriptedExecutor;

    fn host(toml: &str) -> HostConfig {
        Inventory::parse(toml).unwrap().hosts.remove(0)
    }

    #[test]
    fn test_roles_added_in_inventory_order() {
        let host = host(
            r#"
[[hosts]]
name = "web"
roles = [{ name = "iptables" }, { name = "aptitude", packages = ["git"] }, { name = "pip" }]
"#,
        );
        let mut run = Run::new(Context::new(ScriptedExecutor::new()));
        add_configured(&mut run, &host).unwrap();

        assert_eq!(run.role_names(), vec!["iptables", "aptitude", "pip"]);
    }

    #[test]
    fn test_configured_aptitude_is_shared_with_firewall() {
        let host = host(
            r#"
[[hosts]]
name = "web"
roles = [{ name = "aptitude", packages = ["git"] }, { name = "iptables", block_on_finish = false }]
"#,
        );
        let exec = ScriptedExecutor::new();
        let ctx = Context::new(exec.clone()).with_value("aptitude-up-to-date", true);
        let mut run = Run::new(ctx);
        add_configured(&mut run, &host).unwrap();

        let summary = run.execute().unwrap();

        assert_eq!(summary.provisioned, 2);
        assert_eq!(summary.cleanup_commands, 1);
        let installs: Vec<_> = exec
            .commands()
            .into_iter()
            .filter(|c| c.starts_with("aptitude install"))
            .collect();
        assert_eq!(
            installs,
            vec![
                "aptitude install -y curl",
                "aptitude install -y git",
                "aptitude install -y iptables"
            ]
        );
    }

    #[test]
    fn test_borrowed_aptitude_gets_host_interval() {
        let host = host(
            r#"
[[hosts]]
name = "web"
update_interval_minutes = 120
roles = [{ name = "iptables" }]
"#,
        );
        let mut run = Run::new(Context::new(ScriptedExecutor::new()));
        add_configured(&mut run, &host).unwrap();

        let interval = run
            .context()
            .using(|apt: &mut Aptitude| Ok(apt.interval()))
            .unwrap();
        assert_eq!(interval, TimeDelta::minutes(120));
        assert_eq!(run.role_names(), vec!["iptables"]);
    }
}
