//! CentOS/RHEL packages through yum

use super::package::{PackageFamily, PackageManager};
use rolekit::quote;

/// Command set for yum/rpm hosts
pub struct YumFamily;

impl PackageFamily for YumFamily {
    const NAME: &'static str = "yum";
    const UPDATE_COMMAND: &'static str = "yum clean all";
    const INSTALL_COMMAND: &'static str = "yum install -y";
    const FLAG_KEY: &'static str = "yum-up-to-date";
    const MARKER_NAME: &'static str = "last_yum_update";
    const SOURCE_FILE: &'static str = "/etc/yum.repos.d/CentOS-Base.repo";
    const PROBE_SUDO: bool = true;

    fn probe_command(package: &str) -> String {
        format!("rpm -qa {}", quote(package))
    }

    // rpm -qa prints nothing for a package that is not installed
    fn is_installed(_package: &str, probe_output: &str) -> bool {
        !probe_output.trim().is_empty()
    }

    fn gpg_key_command(url: &str) -> String {
        format!("curl {} | rpm --import -", quote(url))
    }
}

/// Package role for RedHat-family hosts
pub type Yum = PackageManager<YumFamily>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
    use rolekit::mock::{Call, ScriptedExecutor};
    use rolekit::{Context, FixedClock, Role};
    use std::rc::Rc;

    const MARKER_PROBE: &str = "test -e /tmp/last_yum_update && echo exists || echo missing";
    const MARKER_READ: &str = "LC_ALL=C cat /tmp/last_yum_update";

    fn new_year() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2013, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn setup() -> (ScriptedExecutor, Context, Yum) {
        let exec = ScriptedExecutor::new();
        let ctx = Context::new(exec.clone());
        let role = Yum::new().with_clock(Rc::new(FixedClock::new(new_year())));
        (exec, ctx, role)
    }

    #[test]
    fn test_provision_installs_curl() {
        let (exec, ctx, mut role) = setup();
        ctx.set("yum-up-to-date", true);

        role.provision(&ctx).unwrap();

        assert_eq!(exec.writes(), vec![Call::new("yum install -y curl", true, false)]);
    }

    #[test]
    fn test_gpg_key() {
        let (exec, ctx, role) = setup();
        role.import_gpg_key(&ctx, "http://some.repo").unwrap();

        assert_eq!(
            exec.calls(),
            vec![Call::new("curl http://some.repo | rpm --import -", true, false)]
        );
    }

    #[test]
    fn test_has_source() {
        let (exec, ctx, role) = setup();
        exec.on_each(
            "cat /etc/yum.repos.d/CentOS-Base.repo",
            &["\n            some\n            repo\n            foo-bar\n            ", "some repo"],
        );

        assert!(role.has_source(&ctx, "foo-bar").unwrap());
        assert!(!role.has_source(&ctx, "foo-bar").unwrap());
        assert_eq!(
            exec.calls()[0],
            Call::new("cat /etc/yum.repos.d/CentOS-Base.repo", true, true)
        );
    }

    #[test]
    fn test_ensure_source() {
        let (exec, ctx, role) = setup();
        exec.on_each(
            "cat /etc/yum.repos.d/CentOS-Base.repo",
            &["", "foo-bar-repo"],
        );

        assert!(role.ensure_source(&ctx, "foo-bar-repo").unwrap());
        assert!(!role.ensure_source(&ctx, "foo-bar-repo").unwrap());
        assert_eq!(
            exec.writes(),
            vec![Call::new(
                "echo foo-bar-repo >> /etc/yum.repos.d/CentOS-Base.repo",
                true,
                false
            )]
        );
    }

    #[test]
    fn test_update_date_file() {
        let (_, _, role) = setup();
        let ctx = Context::new(ScriptedExecutor::new()).with_remote_temp_dir("/foo/bar");
        assert_eq!(role.update_date_file(&ctx), "/foo/bar/last_yum_update");
    }

    #[test]
    fn test_store_update_date() {
        let (exec, ctx, role) = setup();
        role.store_update_date(&ctx).unwrap();

        assert_eq!(
            exec.calls(),
            vec![Call::new(
                "echo '01-01-13 00:00:00' > /tmp/last_yum_update",
                false,
                false
            )]
        );
    }

    #[test]
    fn test_last_update_date() {
        let (exec, ctx, role) = setup();
        exec.on(MARKER_PROBE, "exists");
        exec.on(MARKER_READ, "01-01-13 00:00:00");

        assert_eq!(role.get_last_update(&ctx).unwrap(), Some(new_year()));
    }

    #[test]
    fn test_no_update_yet() {
        let (exec, ctx, role) = setup();
        exec.on(MARKER_PROBE, "missing");

        assert_eq!(role.get_last_update(&ctx).unwrap(), None);
        assert!(!exec.ran(MARKER_READ));
    }

    #[test]
    fn test_updates_after_time_limit() {
        let (exec, ctx, role) = setup();
        exec.on(MARKER_PROBE, "exists");
        exec.on(MARKER_READ, &rolekit::throttle::format_timestamp(new_year() - TimeDelta::minutes(31)));

        assert!(role.ensure_up_to_date(&ctx).unwrap());
        assert!(exec.ran("yum clean all"));
    }

    #[test]
    fn test_no_update_within_time_limit() {
        let (exec, ctx, role) = setup();
        exec.on(MARKER_PROBE, "exists");
        exec.on(MARKER_READ, &rolekit::throttle::format_timestamp(new_year() - TimeDelta::minutes(29)));

        assert!(!role.ensure_up_to_date(&ctx).unwrap());
        assert!(!exec.ran("yum clean all"));
    }

    #[test]
    fn test_force_update() {
        let (exec, ctx, role) = setup();
        role.force_update(&ctx).unwrap();

        assert!(ctx.flag("yum-up-to-date"));
        assert_eq!(exec.calls()[0], Call::new("yum clean all", true, false));
    }

    #[test]
    fn test_package_probe() {
        let (exec, ctx, role) = setup();
        exec.on("rpm -qa foo", "foo-1.0-1.el7.x86_64\n");

        assert!(role.is_package_installed(&ctx, "foo").unwrap());
        assert!(!role.is_package_installed(&ctx, "baz").unwrap());
        assert_eq!(
            exec.calls(),
            vec![
                Call::new("rpm -qa foo", true, true),
                Call::new("rpm -qa baz", true, true)
            ]
        );
    }
}
