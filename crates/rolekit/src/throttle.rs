//! Time-gated refreshes
//!
//! Refreshing a package index is slow, so it runs at most once per
//! interval. The instant of the last successful refresh is persisted in a
//! marker file on the target; within one run a context flag short-circuits
//! the check for every role.
//!
//! The marker holds a UTC instant formatted with [`TIMESTAMP_FORMAT`].
//! Sub-second precision is dropped when writing, and the two-digit year is
//! read back as 1969-2068.

use crate::clock::{Clock, SystemClock};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::executor::{Executor, RemoteFs, quote};
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use std::rc::Rc;

/// Format of the remote marker (day-month-year hour:minute:second)
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%y %H:%M:%S";

/// Minimum minutes between two refreshes unless configured otherwise
pub const DEFAULT_INTERVAL_MINUTES: i64 = 30;

/// Gate for one expensive refresh command.
pub struct UpdateThrottler {
    marker_name: String,
    flag_key: String,
    refresh_command: String,
    refresh_sudo: bool,
    interval: TimeDelta,
    clock: Rc<dyn Clock>,
}

impl UpdateThrottler {
    /// # Arguments
    /// * `marker_name` - File name of the marker inside the remote temp dir
    /// * `flag_key` - Context key set once the refresh ran in this run
    /// * `refresh_command` - The refresh itself, run with sudo
    pub fn new(
        marker_name: impl Into<String>,
        flag_key: impl Into<String>,
        refresh_command: impl Into<String>,
    ) -> Self {
        Self {
            marker_name: marker_name.into(),
            flag_key: flag_key.into(),
            refresh_command: refresh_command.into(),
            refresh_sudo: true,
            interval: TimeDelta::minutes(DEFAULT_INTERVAL_MINUTES),
            clock: Rc::new(SystemClock),
        }
    }

    pub fn with_interval(mut self, interval: TimeDelta) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run the refresh command without sudo
    pub fn without_sudo(mut self) -> Self {
        self.refresh_sudo = false;
        self
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    pub fn flag_key(&self) -> &str {
        &self.flag_key
    }

    /// Path of the marker file on the target
    pub fn marker_path(&self, ctx: &Context) -> String {
        format!(
            "{}/{}",
            ctx.remote_temp_dir().trim_end_matches('/'),
            self.marker_name
        )
    }

    /// Instant of the last successful refresh, `None` if there never was one.
    ///
    /// Unreadable marker content is an [`Error::Parse`]; it is not treated as
    /// "never refreshed".
    pub fn get_last_update(&self, ctx: &Context) -> Result<Option<NaiveDateTime>> {
        let path = self.marker_path(ctx);
        if !ctx.remote_exists(&path)? {
            return Ok(None);
        }

        let content = ctx.read_remote_file(&path, false)?;
        parse_timestamp(&content)
            .map(Some)
            .map_err(|source| Error::Parse {
                path,
                content: content.trim().to_string(),
                source,
            })
    }

    /// Whether the interval has passed since the last refresh.
    ///
    /// Elapsed time exactly equal to the interval does not count.
    pub fn is_due(&self, ctx: &Context) -> Result<bool> {
        Ok(match self.get_last_update(ctx)? {
            None => true,
            Some(last) => self.clock.now() - last > self.interval,
        })
    }

    /// Refresh if this run has not refreshed yet and the interval has passed.
    ///
    /// Returns `true` when the refresh ran.
    pub fn ensure_up_to_date(&self, ctx: &Context) -> Result<bool> {
        if ctx.flag(&self.flag_key) {
            log::debug!("{} already ran in this run", self.refresh_command);
            return Ok(false);
        }
        if !self.is_due(ctx)? {
            log::debug!("{} ran less than {} ago, skipping", self.refresh_command, self.interval);
            return Ok(false);
        }
        self.force_update(ctx)?;
        Ok(true)
    }

    /// Refresh unconditionally, then record it.
    ///
    /// The marker is only written once the refresh command succeeded.
    pub fn force_update(&self, ctx: &Context) -> Result<()> {
        log::info!("Running {}", self.refresh_command);
        ctx.execute(&self.refresh_command, self.refresh_sudo, false)?;
        ctx.set(&self.flag_key, true);
        self.store_update_date(ctx)
    }

    /// Write the current instant to the marker file
    pub fn store_update_date(&self, ctx: &Context) -> Result<()> {
        let stamp = format_timestamp(self.clock.now());
        let command = format!("echo {} > {}", quote(&stamp), quote(&self.marker_path(ctx)));
        ctx.execute(&command, false, false).map(|_| ())
    }
}

/// Render an instant in the marker format
pub fn format_timestamp(instant: NaiveDateTime) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse marker content
pub fn parse_timestamp(content: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(content.trim(), TIMESTAMP_FORMAT)
}

/// Drop the sub-second part, as a write/read cycle does
pub fn truncate_to_seconds(instant: NaiveDateTime) -> NaiveDateTime {
    instant.with_nanosecond(0).unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::mock::ScriptedExecutor;
    use chrono::NaiveDate;

    const MARKER_PROBE: &str = "test -e /tmp/last_test_update && echo exists || echo missing";
    const MARKER_READ: &str = "LC_ALL=C cat /tmp/last_test_update";

    fn new_year() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2013, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn setup(now: NaiveDateTime) -> (ScriptedExecutor, Context, UpdateThrottler) {
        let exec = ScriptedExecutor::new();
        let ctx = Context::new(exec.clone());
        let throttler = UpdateThrottler::new("last_test_update", "test-up-to-date", "pkg refresh")
            .with_clock(Rc::new(FixedClock::new(now)));
        (exec, ctx, throttler)
    }

    fn with_last_update(exec: &ScriptedExecutor, last: NaiveDateTime) {
        exec.on(MARKER_PROBE, "exists\n");
        exec.on(MARKER_READ, &format!("{}\n", format_timestamp(last)));
    }

    #[test]
    fn test_format_matches_marker_layout() {
        assert_eq!(format_timestamp(new_year()), "01-01-13 00:00:00");
        assert_eq!(parse_timestamp("01-01-13 00:00:00\n").unwrap(), new_year());
    }

    #[test]
    fn test_marker_path_inside_temp_dir() {
        let (_, _, throttler) = setup(new_year());
        let ctx = Context::new(ScriptedExecutor::new()).with_remote_temp_dir("/foo/bar/");
        assert_eq!(throttler.marker_path(&ctx), "/foo/bar/last_test_update");
    }

    #[test]
    fn test_no_marker_means_no_last_update() {
        let (exec, ctx, throttler) = setup(new_year());
        exec.on(MARKER_PROBE, "missing\n");

        assert_eq!(throttler.get_last_update(&ctx).unwrap(), None);
        assert!(!exec.ran(MARKER_READ));
    }

    #[test]
    fn test_reads_last_update() {
        let (exec, ctx, throttler) = setup(new_year());
        with_last_update(&exec, new_year());

        assert_eq!(throttler.get_last_update(&ctx).unwrap(), Some(new_year()));
    }

    #[test]
    fn test_garbage_marker_is_parse_error() {
        let (exec, ctx, throttler) = setup(new_year());
        exec.on(MARKER_PROBE, "exists");
        exec.on(MARKER_READ, "yesterday-ish");

        assert!(matches!(throttler.get_last_update(&ctx), Err(Error::Parse { .. })));
        assert!(throttler.ensure_up_to_date(&ctx).is_err());
        assert!(!exec.ran("pkg refresh"));
    }

    #[test]
    fn test_refreshes_when_never_refreshed() {
        let (exec, ctx, throttler) = setup(new_year());
        assert!(throttler.ensure_up_to_date(&ctx).unwrap());
        assert!(exec.ran("pkg refresh"));
    }

    #[test]
    fn test_refreshes_after_interval() {
        let now = new_year();
        let (exec, ctx, throttler) = setup(now);
        with_last_update(&exec, now - TimeDelta::minutes(31));

        assert!(throttler.ensure_up_to_date(&ctx).unwrap());
        assert!(exec.ran("pkg refresh"));
    }

    #[test]
    fn test_skips_within_interval() {
        let now = new_year();
        let (exec, ctx, throttler) = setup(now);
        with_last_update(&exec, now - TimeDelta::minutes(29));

        assert!(!throttler.ensure_up_to_date(&ctx).unwrap());
        assert!(!exec.ran("pkg refresh"));
    }

    #[test]
    fn test_exact_interval_does_not_refresh() {
        let now = new_year();
        let (exec, ctx, throttler) = setup(now);
        with_last_update(&exec, now - TimeDelta::minutes(30));

        assert!(!throttler.ensure_up_to_date(&ctx).unwrap());
        assert!(!exec.ran("pkg refresh"));
    }

    #[test]
    fn test_one_second_past_interval_refreshes() {
        let now = new_year();
        let (exec, ctx, throttler) = setup(now);
        with_last_update(&exec, now - TimeDelta::minutes(30) - TimeDelta::seconds(1));

        assert!(throttler.ensure_up_to_date(&ctx).unwrap());
        assert!(exec.ran("pkg refresh"));
    }

    #[test]
    fn test_context_flag_skips_check() {
        let (exec, ctx, throttler) = setup(new_year());
        ctx.set("test-up-to-date", true);

        assert!(!throttler.ensure_up_to_date(&ctx).unwrap());
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_force_update_order() {
        let (exec, ctx, throttler) = setup(new_year());
        throttler.force_update(&ctx).unwrap();

        assert!(ctx.flag("test-up-to-date"));
        assert_eq!(
            exec.commands(),
            vec![
                "pkg refresh".to_string(),
                "echo '01-01-13 00:00:00' > /tmp/last_test_update".to_string(),
            ]
        );
        assert!(exec.calls()[0].sudo);
        assert!(!exec.calls()[1].sudo);
    }

    #[test]
    fn test_failed_refresh_is_not_recorded() {
        let (exec, ctx, throttler) = setup(new_year());
        exec.fail("pkg refresh", 100, "mirror unreachable");

        assert!(throttler.force_update(&ctx).is_err());
        assert!(!ctx.flag("test-up-to-date"));
        assert_eq!(exec.commands(), vec!["pkg refresh".to_string()]);
    }

    #[test]
    fn test_round_trip_drops_subseconds() {
        let now = new_year() + TimeDelta::milliseconds(1_750) + TimeDelta::hours(13);
        let (exec, ctx, throttler) = setup(now);
        throttler.store_update_date(&ctx).unwrap();

        // Feed what was written back to the reader.
        let written = exec.commands().pop().unwrap();
        let stamp = written
            .strip_prefix("echo '")
            .and_then(|rest| rest.split('\'').next())
            .unwrap()
            .to_string();
        with_last_update(&exec, parse_timestamp(&stamp).unwrap());

        assert_eq!(
            throttler.get_last_update(&ctx).unwrap(),
            Some(truncate_to_seconds(now))
        );
    }
}
