//! Bounded retry with category-driven backoff
//!
//! Every remote call this tool makes (Graph, token endpoints, Google Drive,
//! `git push`) runs through [`RetryExecutor::run`]. A failed attempt is
//! classified from its message; transient categories are retried with the
//! rule's backoff, permanent ones (auth, permission, not-found) fail fast.

pub mod backoff;
pub mod classify;

pub use backoff::BackoffKind;
pub use classify::{Classification, ClassificationRule, Classifier, ErrorCategory};

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors the executor can classify.
///
/// The message used for classification is the `Display` text. A server may
/// also dictate the delay before the next attempt (HTTP `Retry-After`).
pub trait RetryableError: fmt::Display {
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for String {}
impl RetryableError for &str {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Ceiling for `NetworkShort` backoff
    pub network_cap: Duration,
    /// Ceiling for every computed delay (not applied to server retry-after)
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            network_cap: Duration::from_secs(10),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_network_cap(mut self, cap: Duration) -> Self {
        self.network_cap = cap;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before the attempt following failed attempt `attempt`
    pub fn delay_for(
        &self,
        classification: &Classification,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> Duration {
        if let Some(server_delay) = retry_after {
            return server_delay;
        }

        classification
            .backoff
            .delay(self.base_delay, attempt, self.network_cap)
            .min(self.max_delay)
    }
}

/// Final state of a retried operation
#[derive(Debug)]
pub struct AttemptResult<T, E> {
    pub outcome: std::result::Result<T, E>,
    /// Number of times the operation ran (1..=max_attempts)
    pub attempts: u32,
    /// Category of the most recent failure, if any attempt failed
    pub category: Option<ErrorCategory>,
    /// Sleeps taken between attempts
    pub delays: Vec<Duration>,
}

impl<T, E> AttemptResult<T, E> {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }

    pub fn into_result(self) -> std::result::Result<T, E> {
        self.outcome
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    classifier: Classifier,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, classifier: Classifier) -> Self {
        Self { policy, classifier }
    }

    /// Executor that never sleeps between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(
            RetryPolicy::new(max_attempts, Duration::ZERO).with_network_cap(Duration::ZERO),
            Classifier::default(),
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run `op` until it succeeds, hits a non-retryable error, or runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> AttemptResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: RetryableError,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut delays = Vec::new();
        let mut category = None;
        let mut attempt = 1;

        loop {
            let error = match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Succeeded after retry");
                    }
                    return AttemptResult {
                        outcome: Ok(value),
                        attempts: attempt,
                        category,
                        delays,
                    };
                }
                Err(error) => error,
            };

            let message = error.to_string();
            let classification = self.classifier.classify(&message);
            category = Some(classification.category);

            if !classification.retryable || attempt >= max_attempts {
                debug!(
                    operation,
                    attempt,
                    category = %classification.category,
                    retryable = classification.retryable,
                    "Giving up: {}",
                    message
                );
                return AttemptResult {
                    outcome: Err(error),
                    attempts: attempt,
                    category,
                    delays,
                };
            }

            let delay = self
                .policy
                .delay_for(&classification, attempt, error.retry_after());
            warn!(
                operation,
                attempt,
                max_attempts,
                category = %classification.category,
                delay_ms = delay.as_millis() as u64,
                "Retrying: {}",
                message
            );

            tokio::time::sleep(delay).await;
            delays.push(delay);
            attempt += 1;
        }
    }
}
