//! Retry with exponential backoff for transport failures.

use crate::error::Result;
use crate::executor::Executor;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Delay before retrying after attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// A config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Retries commands whose failure is retryable (transport errors only).
///
/// A command that ran and failed is never re-run: it may have had side
/// effects.
#[derive(Debug, Clone)]
pub struct RetryingExecutor<E> {
    inner: E,
    config: RetryConfig,
}

impl<E: Executor> RetryingExecutor<E> {
    pub fn new(inner: E, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Executor> Executor for RetryingExecutor<E> {
    fn execute(&self, command: &str, sudo: bool, capture_output: bool) -> Result<String> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.inner.execute(command, sudo, capture_output) {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.config.delay_for_attempt(attempt);
                    log::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:.1}s...",
                        attempt + 1,
                        max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::ScriptedExecutor;
    use std::cell::Cell;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(5),
        }
    }

    /// Fails with a transport error a fixed number of times, then succeeds.
    struct Flaky {
        failures_left: Cell<u32>,
        calls: Cell<u32>,
    }

    impl Executor for Flaky {
        fn execute(&self, _command: &str, _sudo: bool, _capture: bool) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(Error::transport("connection reset"));
            }
            Ok("up".to_string())
        }
    }

    fn flaky(failures: u32) -> Flaky {
        Flaky {
            failures_left: Cell::new(failures),
            calls: Cell::new(0),
        }
    }

    #[test]
    fn test_delay_backoff() {
        let config = RetryConfig::new(5, Duration::from_secs(2), 2.0);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn test_transport_failure_recovers() {
        let exec = RetryingExecutor::new(flaky(2), fast(3));
        assert_eq!(exec.execute("uptime", false, true).unwrap(), "up");
        assert_eq!(exec.inner().calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let exec = RetryingExecutor::new(flaky(5), fast(2));
        assert!(matches!(
            exec.execute("uptime", false, true),
            Err(Error::Transport { .. })
        ));
        assert_eq!(exec.inner().calls.get(), 2);
    }

    #[test]
    fn test_execution_failure_not_retried() {
        let scripted = ScriptedExecutor::new();
        scripted.fail("aptitude install -y git", 100, "E: broken");
        let exec = RetryingExecutor::new(scripted.clone(), fast(5));

        assert!(exec.execute("aptitude install -y git", true, false).is_err());
        assert_eq!(scripted.calls().len(), 1);
    }

    #[test]
    fn test_no_retry() {
        let exec = RetryingExecutor::new(flaky(1), RetryConfig::no_retry());
        assert!(exec.execute("uptime", false, true).is_err());
        assert_eq!(exec.inner().calls.get(), 1);
    }
}
