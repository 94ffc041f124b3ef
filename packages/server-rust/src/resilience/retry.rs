//! Bounded exponential backoff with jitter around a fallible async operation.
//!
//! The retry loop runs inside the caller's task: backoff sleeps suspend the
//! caller, attempts are strictly sequential, and a cancelled token aborts both
//! an in-flight attempt and a pending sleep. Callers that must not wait spawn
//! the guarded call on its own task.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RetryConfig;
use crate::rpc::status::{RemoteError, StatusCode};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Decision taken after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Succeed,
    Retry,
    Fail,
}

/// Errors that can expose a transport status code to a classifier.
pub trait StatusCoded {
    /// `None` for errors that did not come from a transport; those always fail.
    fn status_code(&self) -> Option<StatusCode>;
}

impl StatusCoded for RemoteError {
    fn status_code(&self) -> Option<StatusCode> {
        Some(self.code)
    }
}

/// Which status codes a retry loop treats as retryable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryClassifier {
    /// Retry unavailable, deadline-exceeded and resource-exhausted.
    #[default]
    Transient,
    /// Retry exactly the listed codes.
    AllowList(Vec<StatusCode>),
    /// Never retry; every error fails on the first attempt.
    Never,
}

impl RetryClassifier {
    /// Classifies a single error. Errors without a status code fail.
    #[must_use]
    pub fn classify<E: StatusCoded>(&self, error: &E) -> RetryAction {
        let Some(code) = error.status_code() else {
            return RetryAction::Fail;
        };
        let retryable = match self {
            Self::Transient => code.is_transient(),
            Self::AllowList(codes) => codes.contains(&code),
            Self::Never => false,
        };
        if retryable {
            RetryAction::Retry
        } else {
            RetryAction::Fail
        }
    }

    /// Classifies the outcome of an attempt. Success is decided without
    /// consulting the error rules.
    #[must_use]
    pub fn classify_outcome<T, E: StatusCoded>(&self, outcome: &Result<T, E>) -> RetryAction {
        match outcome {
            Ok(_) => RetryAction::Succeed,
            Err(error) => self.classify(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A `RetryConfig` that cannot drive a retry loop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidRetryPolicy {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("multiplier must be finite and >= 1, got {0}")]
    Multiplier(f64),
    #[error("jitter must lie within [0, 1], got {0}")]
    Jitter(f64),
}

/// Terminal failure of a guarded call.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    /// An attempt failed with an error the classifier does not retry.
    #[error("non-retryable failure on attempt {attempt}: {error}")]
    Fatal { attempt: u32, error: E },
    /// The cancellation token fired during an attempt or a backoff sleep.
    #[error("cancelled during attempt {attempt}")]
    Cancelled { attempt: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    /// Number of attempts started before the call terminated.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Fatal { attempt, .. } | Self::Cancelled { attempt, .. } => *attempt,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Per-call bookkeeping; never outlives one `RetryPolicy::run`.
#[derive(Debug)]
struct RetryState<E> {
    attempt: u32,
    last_error: Option<E>,
    backoff: Duration,
}

/// Validated retry parameters plus the classifier that drives them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    multiplier: f64,
    jitter: f64,
    classifier: RetryClassifier,
}

impl RetryPolicy {
    /// Builds a policy from a config and an explicit classifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRetryPolicy` for zero attempts, a multiplier below one
    /// (or non-finite), or a jitter fraction outside `[0, 1]`.
    pub fn new(
        config: &RetryConfig,
        classifier: RetryClassifier,
    ) -> Result<Self, InvalidRetryPolicy> {
        if config.max_attempts == 0 {
            return Err(InvalidRetryPolicy::ZeroAttempts);
        }
        if !config.multiplier.is_finite() || config.multiplier < 1.0 {
            return Err(InvalidRetryPolicy::Multiplier(config.multiplier));
        }
        if !(0.0..=1.0).contains(&config.jitter) {
            return Err(InvalidRetryPolicy::Jitter(config.jitter));
        }
        Ok(Self {
            max_attempts: config.max_attempts,
            base_backoff: config.base_backoff,
            multiplier: config.multiplier,
            jitter: config.jitter,
            classifier,
        })
    }

    /// Builds a policy that retries the transient status codes.
    ///
    /// # Errors
    ///
    /// See [`RetryPolicy::new`].
    pub fn from_config(config: &RetryConfig) -> Result<Self, InvalidRetryPolicy> {
        Self::new(config, RetryClassifier::Transient)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn classifier(&self) -> &RetryClassifier {
        &self.classifier
    }

    /// Un-jittered delay after the 1-based `attempt`: `base * multiplier^(attempt - 1)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// `backoff(attempt)` scaled by a uniform factor in `[1 - jitter, 1 + jitter]`.
    pub fn jittered_backoff<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.backoff(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rng.random_range(-self.jitter..=self.jitter);
        Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// runs out of attempts, or `cancel` fires.
    ///
    /// The closure receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// - `RetryError::Fatal` on the first error the classifier does not retry
    /// - `RetryError::Exhausted` with the last error once `max_attempts` is reached
    /// - `RetryError::Cancelled` if the token fires while an attempt or sleep is pending
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StatusCoded + Display,
    {
        let mut state = RetryState {
            attempt: 0,
            last_error: None,
            backoff: Duration::ZERO,
        };

        loop {
            state.attempt += 1;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryError::Cancelled {
                        attempt: state.attempt,
                        last: state.last_error,
                    });
                }
                outcome = operation(state.attempt) => outcome,
            };

            let error = match (self.classifier.classify_outcome(&outcome), outcome) {
                (_, Ok(value)) => return Ok(value),
                (RetryAction::Retry, Err(error)) => error,
                (_, Err(error)) => {
                    return Err(RetryError::Fatal {
                        attempt: state.attempt,
                        error,
                    });
                }
            };

            if state.attempt >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: state.attempt,
                    last: error,
                });
            }

            state.backoff = self.jittered_backoff(state.attempt, &mut rand::rng());
            debug!(
                attempt = state.attempt,
                backoff_ms = u64::try_from(state.backoff.as_millis()).unwrap_or(u64::MAX),
                %error,
                "retrying after transient failure"
            );
            metrics::counter!("cinemesh_retry_attempts_total").increment(1);
            state.last_error = Some(error);

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryError::Cancelled {
                        attempt: state.attempt,
                        last: state.last_error,
                    });
                }
                () = tokio::time::sleep(state.backoff) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
