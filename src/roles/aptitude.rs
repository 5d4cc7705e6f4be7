//! Debian/Ubuntu packages through aptitude

use super::package::{PackageFamily, PackageManager};
use rolekit::quote;

/// Command set for aptitude/dpkg hosts
pub struct AptitudeFamily;

impl PackageFamily for AptitudeFamily {
    const NAME: &'static str = "aptitude";
    const UPDATE_COMMAND: &'static str = "aptitude update";
    const INSTALL_COMMAND: &'static str = "aptitude install -y";
    const FLAG_KEY: &'static str = "aptitude-up-to-date";
    const MARKER_NAME: &'static str = "last_aptitude_update";
    const SOURCE_FILE: &'static str = "/etc/apt/sources.list";
    const PROBE_SUDO: bool = false;

    fn probe_command(_package: &str) -> String {
        "dpkg -l".to_string()
    }

    /// Looks for an `ii` (installed) row whose package column matches,
    /// ignoring any `:arch` suffix
    fn is_installed(package: &str, probe_output: &str) -> bool {
        probe_output.lines().any(|line| {
            let mut columns = line.split_whitespace();
            columns.next() == Some("ii")
                && columns
                    .next()
                    .and_then(|name| name.split(':').next())
                    .is_some_and(|name| name == package)
        })
    }

    fn gpg_key_command(url: &str) -> String {
        format!("curl -fsSL {} | apt-key add -", quote(url))
    }
}

/// Package role for Debian-family hosts
pub type Aptitude = PackageManager<AptitudeFamily>;
