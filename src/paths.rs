//! Path resolution for the provisor inventory
//!
//! # Environment Variables
//!
//! - `PROVISOR_CONFIG` - Inventory file to use when `--config` is not given
//!
//! # Inventory Resolution Priority
//!
//! 1. `--config <path>`
//! 2. `PROVISOR_CONFIG` environment variable
//! 3. `./provisor.toml` when it exists
//! 4. `<config dir>/provisor.toml`, where the config dir is
//!    `XDG_CONFIG_HOME/provisor` if set, else `~/.config/provisor`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming the inventory file
pub const ENV_CONFIG: &str = "PROVISOR_CONFIG";

/// Inventory file name
pub const CONFIG_FILE: &str = "provisor.toml";

/// Get the provisor config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("provisor");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("provisor"))
}

/// Locate the inventory file
pub fn inventory_path(explicit: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Could not determine current directory")?;
    resolve_inventory(
        explicit,
        std::env::var(ENV_CONFIG).ok().as_deref(),
        &cwd,
        &config_dir()?,
    )
}

fn resolve_inventory(
    explicit: Option<&Path>,
    from_env: Option<&str>,
    cwd: &Path,
    config_dir: &Path,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand(&path.to_string_lossy()));
    }

    if let Some(value) = from_env.filter(|v| !v.is_empty()) {
        let path = expand(value);
        log::debug!("Using inventory from {}: {}", ENV_CONFIG, path.display());
        return Ok(path);
    }

    let local = cwd.join(CONFIG_FILE);
    if local.exists() {
        log::debug!("Using inventory in current directory: {}", local.display());
        return Ok(local);
    }

    let path = config_dir.join(CONFIG_FILE);
    log::debug!("Using default inventory: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_wins() {
        let cwd = TempDir::new().unwrap();
        std::fs::write(cwd.path().join(CONFIG_FILE), "").unwrap();

        let result = resolve_inventory(
            Some(Path::new("/etc/provisor/site.toml")),
            Some("/from/env.toml"),
            cwd.path(),
            Path::new("/home/me/.config/provisor"),
        )
        .unwrap();
        assert_eq!(result, PathBuf::from("/etc/provisor/site.toml"));
    }

    #[test]
    fn test_env_before_local_file() {
        let cwd = TempDir::new().unwrap();
        std::fs::write(cwd.path().join(CONFIG_FILE), "").unwrap();

        let result = resolve_inventory(
            None,
            Some("/from/env.toml"),
            cwd.path(),
            Path::new("/cfg"),
        )
        .unwrap();
        assert_eq!(result, PathBuf::from("/from/env.toml"));
    }

    #[test]
    fn test_local_file_when_present() {
        let cwd = TempDir::new().unwrap();
        std::fs::write(cwd.path().join(CONFIG_FILE), "").unwrap();

        let result = resolve_inventory(None, Some(""), cwd.path(), Path::new("/cfg")).unwrap();
        assert_eq!(result, cwd.path().join(CONFIG_FILE));
    }

    #[test]
    fn test_falls_back_to_config_dir() {
        let cwd = TempDir::new().unwrap();

        let result = resolve_inventory(None, None, cwd.path(), Path::new("/cfg")).unwrap();
        assert_eq!(result, PathBuf::from("/cfg/provisor.toml"));
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
