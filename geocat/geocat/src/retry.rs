//! Retrying of single network operations.
//!
//! [`execute`] runs an operation, and while it fails with something the
//! [`RetrySettings::retry_condition`] accepts, waits a backoff interval and
//! runs it again, up to [`RetrySettings::max_attempts`] attempts in total.
//! The wait is cut short by cancellation.

use crate::cancellation::CancellationContext;
use crate::error::{Error, Result};
use crate::network::HttpResponse;
use std::{fmt, future::Future, sync::Arc, time::Duration};

/// Statuses the default retry condition treats as transient.
pub const RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Default number of attempts, first attempt included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default initial backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(200);

/// Default cap for exponential backoff.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Decides whether a failed attempt may be retried.
///
/// Receives either a response with a non-success status or an error.
pub type RetryCondition = Arc<dyn Fn(&Result<HttpResponse>) -> bool + Send + Sync>;

/// Delay curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed(Duration),
    /// `base * n` before the n-th retry.
    Linear(Duration),
    /// `base * 2^(n-1)` before the n-th retry, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Upper bound for any single delay.
        max: Duration,
    },
}

impl Backoff {
    /// Delay before the `retry`-th retry (1-based), without jitter.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(base) => base.saturating_mul(retry),
            Backoff::Exponential { base, max } => {
                let factor = 1u32 << (retry - 1).min(20);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

/// The default retry condition: transient statuses and transport failures.
#[must_use]
pub fn default_retry_condition(result: &Result<HttpResponse>) -> bool {
    match result {
        Ok(response) => RETRYABLE_STATUSES.contains(&response.status),
        Err(Error::Network { .. }) => true,
        Err(_) => false,
    }
}

/// Retry configuration.
#[derive(Clone)]
pub struct RetrySettings {
    /// Total attempts, first attempt included. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay curve.
    pub backoff: Backoff,
    /// Randomize each delay uniformly within `[0, delay]`.
    pub jitter: bool,
    /// Which failures are worth another attempt.
    pub retry_condition: RetryCondition,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
            jitter: true,
            retry_condition: Arc::new(default_retry_condition),
        }
    }
}

impl fmt::Debug for RetrySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySettings")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl RetrySettings {
    /// Set the total number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the delay curve.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the retry condition.
    #[must_use]
    pub fn with_retry_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Result<HttpResponse>) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Arc::new(condition);
        self
    }

    fn delay(&self, retry: u32) -> Duration {
        let delay = self.backoff.delay(retry);
        if self.jitter {
            delay.mul_f64(rand::random::<f64>())
        } else {
            delay
        }
    }
}

/// Run `operation` until it succeeds, fails terminally, or runs out of
/// attempts.
///
/// `operation` receives the 1-based attempt number. A response with a
/// non-success status that is not retried is returned as `Ok`; classifying it
/// is up to the caller. Errors that are not [`Error::is_retryable`] (a
/// cancellation, or a status the operation already classified as terminal)
/// are returned at once without consulting the condition. A
/// cancellation observed before an attempt or during a backoff wait aborts
/// with [`Error::Cancelled`].
pub async fn execute<F, Fut>(
    settings: &RetrySettings,
    context: &CancellationContext,
    mut operation: F,
) -> Result<HttpResponse>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<HttpResponse>>,
{
    let max_attempts = settings.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        context.check()?;
        attempt += 1;

        let result = operation(attempt).await;
        match &result {
            Ok(response) if response.is_success() => return result,
            Err(e) if !e.is_retryable() => return result,
            _ => {}
        }
        if attempt >= max_attempts || !(settings.retry_condition)(&result) {
            return result;
        }

        let delay = settings.delay(attempt);
        match &result {
            Ok(response) => {
                tracing::warn!(attempt, status = response.status, ?delay, "retrying request");
            }
            Err(e) => tracing::warn!(attempt, error = %e, ?delay, "retrying request"),
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = context.cancelled() => return Err(Error::Cancelled),
        }
    }
}
