//! Shared package-manager role
//!
//! Aptitude and yum differ only in command lines and file locations, which a
//! [`PackageFamily`] describes. Everything else (refresh throttling, source
//! lists, the installed cache) lives here.

use chrono::{NaiveDateTime, TimeDelta};
use rolekit::{
    Capability, Clock, Context, Executor, LineFile, Result, Role, UpdateThrottler, ensure, quote,
};
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::rc::Rc;

/// Command lines and paths of one package manager.
pub trait PackageFamily: 'static {
    /// Role name
    const NAME: &'static str;
    /// Refreshes the package index
    const UPDATE_COMMAND: &'static str;
    /// Installs; the package name is appended
    const INSTALL_COMMAND: &'static str;
    /// Context flag set once the index was refreshed in this run
    const FLAG_KEY: &'static str;
    /// Marker file name in the remote temp dir
    const MARKER_NAME: &'static str;
    /// File holding repository source lines
    const SOURCE_FILE: &'static str;
    /// Whether the installed probe runs elevated
    const PROBE_SUDO: bool;

    /// Read-only command whose output tells whether `package` is installed
    fn probe_command(package: &str) -> String;

    /// Interpret the probe output
    fn is_installed(package: &str, probe_output: &str) -> bool;

    /// Command importing the signing key published at `url`
    fn gpg_key_command(url: &str) -> String;
}

/// A package-manager role for family `F`.
///
/// The instance remembers what it installed, so asking twice for the same
/// package in one run probes the host once.
pub struct PackageManager<F: PackageFamily> {
    packages: Vec<String>,
    sources: Vec<String>,
    gpg_keys: Vec<String>,
    installed: BTreeSet<String>,
    throttler: UpdateThrottler,
    family: PhantomData<F>,
}

impl<F: PackageFamily> Default for PackageManager<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: PackageFamily> PackageManager<F> {
    pub fn new() -> Self {
        Self {
            packages: Vec::new(),
            sources: Vec::new(),
            gpg_keys: Vec::new(),
            installed: BTreeSet::new(),
            throttler: UpdateThrottler::new(F::MARKER_NAME, F::FLAG_KEY, F::UPDATE_COMMAND),
            family: PhantomData,
        }
    }

    /// Packages installed on provision, after `curl`
    pub fn with_packages(mut self, packages: Vec<String>) -> Self {
        self.packages = packages;
        self
    }

    /// Source lines ensured on provision
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Signing keys imported on provision, before sources
    pub fn with_gpg_keys(mut self, urls: Vec<String>) -> Self {
        self.gpg_keys = urls;
        self
    }

    /// Minimum time between two index refreshes
    pub fn with_interval(mut self, interval: TimeDelta) -> Self {
        self.throttler = self.throttler.with_interval(interval);
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.throttler = self.throttler.with_clock(clock);
        self
    }

    pub fn interval(&self) -> TimeDelta {
        self.throttler.interval()
    }

    // =========================================================================
    // Index refresh
    // =========================================================================

    /// Remote marker recording the last refresh
    pub fn update_date_file(&self, ctx: &Context) -> String {
        self.throttler.marker_path(ctx)
    }

    pub fn get_last_update(&self, ctx: &Context) -> Result<Option<NaiveDateTime>> {
        self.throttler.get_last_update(ctx)
    }

    pub fn store_update_date(&self, ctx: &Context) -> Result<()> {
        self.throttler.store_update_date(ctx)
    }

    /// Refresh the index unless it was refreshed recently; `true` if it ran
    pub fn ensure_up_to_date(&self, ctx: &Context) -> Result<bool> {
        self.throttler.ensure_up_to_date(ctx)
    }

    pub fn force_update(&self, ctx: &Context) -> Result<()> {
        self.throttler.force_update(ctx)
    }

    // =========================================================================
    // Sources
    // =========================================================================

    fn source_file() -> LineFile {
        LineFile::new(F::SOURCE_FILE, true)
    }

    /// Whether some line of the source file contains `line`
    pub fn has_source(&self, ctx: &Context, line: &str) -> Result<bool> {
        Self::source_file().has_line(ctx, line)
    }

    /// Append `line` to the source file if missing; `true` when appended
    pub fn ensure_source(&self, ctx: &Context, line: &str) -> Result<bool> {
        Self::source_file().ensure_line(ctx, line)
    }

    /// Import the signing key at `url`.
    ///
    /// Runs on every provision: `apt-key add` and `rpm --import` both accept a
    /// key that is already known.
    pub fn import_gpg_key(&self, ctx: &Context, url: &str) -> Result<()> {
        log::info!("Importing GPG key from {url}");
        ctx.execute(&F::gpg_key_command(url), true, false).map(|_| ())
    }

    // =========================================================================
    // Packages
    // =========================================================================

    pub fn is_package_installed(&self, ctx: &Context, package: &str) -> Result<bool> {
        let output = ctx.execute(&F::probe_command(package), F::PROBE_SUDO, true)?;
        Ok(F::is_installed(package, &output))
    }

    /// Install `package` if missing; `true` when it was installed now.
    ///
    /// The index is brought up to date before installing.
    pub fn ensure_package_installed(&mut self, ctx: &Context, package: &str) -> Result<bool> {
        if self.installed.contains(package) {
            return Ok(false);
        }

        let changed = ensure(
            || self.is_package_installed(ctx, package),
            || {
                self.ensure_up_to_date(ctx)?;
                log::info!("Installing {package} via {}", F::NAME);
                ctx.execute(
                    &format!("{} {}", F::INSTALL_COMMAND, quote(package)),
                    true,
                    false,
                )
                .map(|_| ())
            },
        )?;
        self.installed.insert(package.to_string());
        Ok(changed)
    }
}

impl<F: PackageFamily> Role for PackageManager<F> {
    fn name(&self) -> &'static str {
        F::NAME
    }

    fn provision(&mut self, ctx: &Context) -> Result<()> {
        for url in &self.gpg_keys {
            self.import_gpg_key(ctx, url)?;
        }

        self.ensure_up_to_date(ctx)?;

        let mut added = false;
        for line in &self.sources {
            added |= self.ensure_source(ctx, line)?;
        }
        if added {
            self.force_update(ctx)?;
        }

        self.ensure_package_installed(ctx, "curl")?;
        for package in self.packages.clone() {
            self.ensure_package_installed(ctx, &package)?;
        }
        Ok(())
    }
}

impl<F: PackageFamily> Capability for PackageManager<F> {
    fn create(_ctx: &Context) -> Result<Self> {
        Ok(Self::new())
    }
}
