//! Probe-then-mutate helpers
//!
//! Every `ensure_*` operation follows the same shape: a read-only probe,
//! then a mutation only when the probe says the target is missing. The
//! return value tells the caller whether anything changed.

use crate::error::Result;
use crate::executor::{Executor, RemoteFs, quote};

/// Run `apply` only when `probe` reports the target is missing.
///
/// Returns `true` when `apply` ran. Probe errors propagate untouched; a
/// failed probe never counts as "missing".
pub fn ensure<P, A>(probe: P, apply: A) -> Result<bool>
where
    P: FnOnce() -> Result<bool>,
    A: FnOnce() -> Result<()>,
{
    if probe()? {
        return Ok(false);
    }
    apply()?;
    Ok(true)
}

/// Remote multi-line output, split into trimmed non-empty lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    lines: Vec<String>,
}

impl Listing {
    pub fn parse(raw: &str) -> Self {
        Self {
            lines: raw
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Whether any line contains `needle`.
    ///
    /// This is the presence test used by source lists: a partial match on a
    /// line counts.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }

    /// Whether some line equals `line` exactly (after trimming both)
    pub fn contains_line(&self, line: &str) -> bool {
        let line = line.trim();
        self.lines.iter().any(|l| l == line)
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

/// A remote configuration file managed one line at a time.
///
/// Lines are appended, newline-terminated, only when no existing line
/// contains them already.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFile {
    path: String,
    sudo: bool,
}

impl LineFile {
    pub fn new(path: impl Into<String>, sudo: bool) -> Self {
        Self {
            path: path.into(),
            sudo,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current content as a listing
    pub fn listing<E: Executor + ?Sized>(&self, executor: &E) -> Result<Listing> {
        let raw = executor.execute(&format!("cat {}", quote(&self.path)), self.sudo, true)?;
        Ok(Listing::parse(&raw))
    }

    /// Whether any line of the file contains `line`
    pub fn has_line<E: Executor + ?Sized>(&self, executor: &E, line: &str) -> Result<bool> {
        Ok(self.listing(executor)?.contains(line))
    }

    /// Append `line` unless it is already present; `true` when appended
    pub fn ensure_line<E: Executor + ?Sized>(&self, executor: &E, line: &str) -> Result<bool> {
        ensure(
            || self.has_line(executor, line),
            || {
                log::info!("Adding line to {}: {line}", self.path);
                executor
                    .execute(&append_line_command(&self.path, line), self.sudo, false)
                    .map(|_| ())
            },
        )
    }

    /// Whether the file exists at all
    pub fn exists<E: Executor + ?Sized>(&self, executor: &E) -> Result<bool> {
        executor.remote_exists(&self.path)
    }
}

/// Shell command appending `line` plus a newline to `path`
pub fn append_line_command(path: &str, line: &str) -> String {
    format!("echo {} >> {}", quote(line), quote(path))
}
