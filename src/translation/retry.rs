/*!
 * Per-batch retry and backoff.
 *
 * A failed attempt is retried when the error is retryable and retries
 * remain. The n-th retry waits `min_delay * 2^(n-1)` plus up to a quarter
 * of that as random jitter, never more than `MAX_BACKOFF` in total.
 */

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::app_config::JobOptions;
use crate::errors::ProviderError;

/// Ceiling on any single backoff delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Backoff policy for one job
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    max_retries: u32,
    /// Delay before the first retry
    min_delay: Duration,
    /// Ceiling on a single delay
    max_delay: Duration,
    /// Whether to add random jitter
    jitter: bool,
}

/// Result of running an operation under the policy
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ProviderError>,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, min_delay_ms: u64) -> Self {
        Self {
            max_retries,
            min_delay: Duration::from_millis(min_delay_ms),
            max_delay: MAX_BACKOFF,
            jitter: true,
        }
    }

    pub fn from_options(options: &JobOptions) -> Self {
        Self::new(options.max_retries, options.min_delay_ms)
    }

    /// Disable jitter, making delays deterministic
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether to retry after `retries_done` retries failed with `error`
    pub fn should_retry(&self, retries_done: u32, error: &ProviderError) -> bool {
        retries_done < self.max_retries && error.is_retryable()
    }

    /// Delay before retry number `retry` (1-based), without jitter
    pub fn base_delay(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(31);
        let millis = (self.min_delay.as_millis() as u64).saturating_mul(1u64 << shift);
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Delay before retry number `retry` (1-based), jitter included
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if !self.jitter {
            return base;
        }

        let spread = base.as_millis() as u64 / 4;
        let jitter = if spread == 0 { 0 } else { rand::rng().random_range(0..=spread) };
        (base + Duration::from_millis(jitter)).min(self.max_delay)
    }

    /// Run `attempt` until it succeeds, fails terminally or retries run out.
    ///
    /// `attempt` receives the 1-based attempt number. `before_retry` is called
    /// with the failed attempt number, the chosen delay and the error; returning
    /// `false` stops retrying (e.g. the job was cancelled).
    pub async fn run<T, F, Fut, R>(&self, attempt: F, before_retry: R) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        R: FnMut(u32, Duration, &ProviderError) -> bool,
    {
        self.run_until(attempt, before_retry, std::future::pending::<()>()).await
    }

    /// Like [`run`](Self::run), but a backoff sleep ends early when `stop`
    /// resolves, and no further attempt is made.
    pub async fn run_until<T, F, Fut, R, S>(&self, mut attempt: F, mut before_retry: R, stop: S) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        R: FnMut(u32, Duration, &ProviderError) -> bool,
        S: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let error = match attempt(attempts).await {
                Ok(value) => return RetryOutcome { result: Ok(value), attempts },
                Err(error) => error,
            };

            if !self.should_retry(attempts - 1, &error) {
                debug!("Giving up after {} attempt(s): {}", attempts, error);
                return RetryOutcome { result: Err(error), attempts };
            }

            let delay = self.delay_for(attempts);
            if !before_retry(attempts, delay, &error) {
                return RetryOutcome { result: Err(error), attempts };
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut stop => {
                    debug!("Backoff interrupted after {} attempt(s)", attempts);
                    return RetryOutcome { result: Err(error), attempts };
                }
            }
        }
    }
}

/// Retry bookkeeping for one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    /// Attempts started so far
    pub attempts: u32,
    /// Delay chosen before the next attempt, if one is pending
    pub next_delay_ms: Option<u64>,
    /// Message of the most recent failure
    pub last_error: Option<String>,
}

/// Retry records for a job's batches, indexed by `batch_no`
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    records: Vec<RetryRecord>,
}

impl RetryState {
    pub fn new(total_batches: usize) -> Self {
        Self {
            records: vec![RetryRecord::default(); total_batches],
        }
    }

    fn slot_mut(&mut self, batch_no: usize) -> Option<&mut RetryRecord> {
        batch_no.checked_sub(1).and_then(|i| self.records.get_mut(i))
    }

    /// Record the start of attempt `attempt`
    pub fn record_attempt(&mut self, batch_no: usize, attempt: u32) {
        if let Some(record) = self.slot_mut(batch_no) {
            record.attempts = record.attempts.max(attempt);
            record.next_delay_ms = None;
        }
    }

    /// Record a failure and the delay chosen before the next attempt
    pub fn record_backoff(&mut self, batch_no: usize, delay: Duration, error: &ProviderError) {
        if let Some(record) = self.slot_mut(batch_no) {
            record.next_delay_ms = Some(delay.as_millis() as u64);
            record.last_error = Some(error.to_string());
        }
    }

    /// Record the final failure of a batch
    pub fn record_failure(&mut self, batch_no: usize, error: &ProviderError) {
        if let Some(record) = self.slot_mut(batch_no) {
            record.next_delay_ms = None;
            record.last_error = Some(error.to_string());
        }
    }

    pub fn get(&self, batch_no: usize) -> Option<&RetryRecord> {
        batch_no.checked_sub(1).and_then(|i| self.records.get(i))
    }

    /// Attempts recorded for a batch (0 if unknown)
    pub fn attempts(&self, batch_no: usize) -> u32 {
        self.get(batch_no).map_or(0, |r| r.attempts)
    }

    /// Retries across all batches
    pub fn total_retries(&self) -> u32 {
        self.records.iter().map(|r| r.attempts.saturating_sub(1)).sum()
    }
}
