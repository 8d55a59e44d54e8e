use crate::{config::RetryConfig, CancellationToken, Error};
use chrono::{DateTime, Utc};
use detector_models::Clock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// DependencyRecord describes a single attempted call of an external dependency.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DependencyRecord {
    pub target: String,
    pub command: String,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    pub success: bool,
}

/// DependencyTracker observes every attempted dependency call.
/// It's used for telemetry of the dependency and never alters control flow.
pub trait DependencyTracker: Send + Sync {
    fn track(&self, record: DependencyRecord);
}

/// TracingTracker logs dependency records as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTracker;

impl DependencyTracker for TracingTracker {
    fn track(&self, record: DependencyRecord) {
        tracing::debug!(
            dependency = %record.target,
            command = %record.command,
            start_time = %record.start_time,
            duration_ms = record.duration.as_millis() as u64,
            success = record.success,
            "dependency call"
        );
    }
}

/// RetryPolicy runs operations against a named dependency, retrying
/// retryable failures with exponential backoff. A policy holds no per-call
/// state and is shared by every call site of its dependency.
pub struct RetryPolicy {
    dependency: String,
    max_attempts: u32,
    backoff_base: u32,
    max_backoff: Duration,
    retryable: fn(&Error) -> bool,
    tracker: Arc<dyn DependencyTracker>,
    clock: Arc<dyn Clock>,
}

impl RetryPolicy {
    pub fn new(
        dependency: impl Into<String>,
        config: &RetryConfig,
        tracker: Arc<dyn DependencyTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dependency: dependency.into(),
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
            max_backoff: config.max_backoff,
            retryable: Error::is_transient,
            tracker,
            clock,
        }
    }

    /// Replace the predicate which decides whether a failure is retried.
    pub fn with_retryable(self, retryable: fn(&Error) -> bool) -> Self {
        Self { retryable, ..self }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait which follows failed attempt `attempt`, counted from zero:
    /// `backoff_base ^ attempt` seconds, capped at the configured maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = u64::from(self.backoff_base).saturating_pow(attempt);
        Duration::from_secs(secs).min(self.max_backoff)
    }

    /// Execute `operation` until it succeeds, fails with an error which isn't
    /// retryable, or has been attempted `max_attempts` times. The last error
    /// is returned. Cancellation aborts a pending backoff.
    pub async fn execute<T, F, Fut>(
        &self,
        command: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 0;

        loop {
            let start_time = self.clock.now();
            let started = tokio::time::Instant::now();
            let result = operation().await;

            self.tracker.track(DependencyRecord {
                target: self.dependency.clone(),
                command: command.to_string(),
                start_time,
                duration: started.elapsed(),
                success: result.is_ok(),
            });

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt + 1 >= self.max_attempts || !(self.retryable)(&err) {
                return Err(err);
            }
            let delay = self.backoff(attempt);

            tracing::warn!(
                dependency = %self.dependency,
                command,
                attempt,
                ?delay,
                error = %err,
                "dependency call failed (will retry)"
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => (),
            }
            attempt += 1;
        }
    }
}
