//! Python packages through pip

use super::aptitude::Aptitude;
use rolekit::{Capability, Context, Executor, Result, Role, ensure, quote};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A package name with an optional pinned version (`name==version`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PackageSpec {
    pub name: String,
    pub version: Option<String>,
}

impl PackageSpec {
    pub fn parse(spec: &str) -> Self {
        match spec.split_once("==") {
            Some((name, version)) => Self {
                name: name.trim().to_string(),
                version: Some(version.trim().to_string()).filter(|v| !v.is_empty()),
            },
            None => Self {
                name: spec.trim().to_string(),
                version: None,
            },
        }
    }

    /// Argument for `pip install`
    fn install_arg(&self) -> String {
        match &self.version {
            Some(version) => format!("{}=={}", quote(&self.name), quote(version)),
            None => quote(&self.name),
        }
    }
}

impl From<String> for PackageSpec {
    fn from(spec: String) -> Self {
        Self::parse(&spec)
    }
}

impl From<PackageSpec> for String {
    fn from(spec: PackageSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}=={}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Installs and removes Python packages with pip.
///
/// Package names are compared case-insensitively, as pip does.
pub struct Pip {
    use_sudo: bool,
    packages: Vec<PackageSpec>,
    requirements: Vec<String>,
}

impl Default for Pip {
    fn default() -> Self {
        Self {
            use_sudo: true,
            packages: Vec::new(),
            requirements: Vec::new(),
        }
    }
}

impl Pip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packages(mut self, packages: Vec<PackageSpec>) -> Self {
        self.packages = packages;
        self
    }

    /// Requirement files installed on provision
    pub fn with_requirements(mut self, paths: Vec<String>) -> Self {
        self.requirements = paths;
        self
    }

    /// Whether pip commands run elevated; off inside a virtualenv
    pub fn set_sudo(&mut self, use_sudo: bool) {
        self.use_sudo = use_sudo;
    }

    pub fn uses_sudo(&self) -> bool {
        self.use_sudo
    }

    /// Installed packages, lowercase name to version, from `pip freeze`
    pub fn installed_packages(&self, ctx: &Context) -> Result<BTreeMap<String, String>> {
        let output = ctx.execute("pip freeze", false, true)?;
        Ok(parse_freeze(&output))
    }

    /// Whether `name` is installed, at `version` when one is given
    pub fn is_package_installed(&self, ctx: &Context, name: &str, version: Option<&str>) -> Result<bool> {
        let installed = self.installed_packages(ctx)?;
        Ok(match installed.get(&name.to_lowercase()) {
            None => false,
            Some(current) => version.is_none_or(|wanted| wanted == current),
        })
    }

    /// Install `name` (pinned to `version` if given) unless already present.
    ///
    /// A different installed version is replaced.
    pub fn ensure_package_installed(&self, ctx: &Context, name: &str, version: Option<&str>) -> Result<bool> {
        let spec = PackageSpec {
            name: name.to_string(),
            version: version.map(str::to_string),
        };
        ensure(
            || self.is_package_installed(ctx, name, version),
            || {
                log::info!("Installing {spec} via pip");
                ctx.execute(&format!("pip install {}", spec.install_arg()), self.use_sudo, false)
                    .map(|_| ())
            },
        )
    }

    /// Install everything listed in a remote requirements file
    pub fn ensure_requirements_installed(&self, ctx: &Context, path: &str) -> Result<()> {
        log::info!("Installing requirements from {path}");
        ctx.execute(&format!("pip install -r {}", quote(path)), self.use_sudo, false)
            .map(|_| ())
    }

    /// Uninstall `name` if present; `true` when removed
    pub fn remove_package(&self, ctx: &Context, name: &str) -> Result<bool> {
        if !self.is_package_installed(ctx, name, None)? {
            return Ok(false);
        }
        log::info!("Removing {name} via pip");
        ctx.execute(&format!("pip uninstall -y {}", quote(name)), self.use_sudo, false)?;
        Ok(true)
    }

    fn ensure_pip(&self, ctx: &Context) -> Result<bool> {
        ensure(
            || Ok(!ctx.execute("command -v pip || true", false, true)?.trim().is_empty()),
            || {
                log::info!("Bootstrapping pip");
                ctx.execute("easy_install pip", true, false).map(|_| ())
            },
        )
    }
}

impl Role for Pip {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn provision(&mut self, ctx: &Context) -> Result<()> {
        ctx.using(|aptitude: &mut Aptitude| {
            aptitude.ensure_package_installed(ctx, "python-setuptools")?;
            aptitude.ensure_package_installed(ctx, "python-dev")?;
            Ok(())
        })?;
        self.ensure_pip(ctx)?;

        for spec in &self.packages {
            self.ensure_package_installed(ctx, &spec.name, spec.version.as_deref())?;
        }
        for path in &self.requirements {
            self.ensure_requirements_installed(ctx, path)?;
        }
        Ok(())
    }
}

impl Capability for Pip {
    fn create(_ctx: &Context) -> Result<Self> {
        Ok(Self::new())
    }
}

/// Parse `pip freeze` output.
///
/// Editable installs (`-e ...`) and comments are skipped; direct references
/// (`name @ url`) are kept with an empty version.
fn parse_freeze(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("-e "))
        .filter_map(|line| {
            if let Some((name, version)) = line.split_once("==") {
                Some((name.trim().to_lowercase(), version.trim().to_string()))
            } else {
                line.split_once(" @ ")
                    .map(|(name, _)| (name.trim().to_lowercase(), String::new()))
            }
        })
        .collect()
}
