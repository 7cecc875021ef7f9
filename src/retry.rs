//! Retry logic with exponential backoff
//!
//! Content downloads from the CDN occasionally time out or hit a 5xx. Those
//! requests are retried with exponential backoff and optional jitter. A 404
//! is an answer, not a transient failure, and is never retried.
//!
//! The SOAP listing request is deliberately not routed through here.
//!
//! # Example
//!
//! ```no_run
//! use nus_update::retry::{IsRetryable, fetch_with_retry};
//! use nus_update::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let bytes = fetch_with_retry(&config, || async {
//!     Ok::<_, MyError>(vec![0u8; 4])
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::TitleError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TitleError {
    fn is_retryable(&self) -> bool {
        match self {
            // No status means the request never got an answer (timeout, reset, refused)
            TitleError::Http { status: None, .. } => true,
            TitleError::Http {
                status: Some(code), ..
            } => *code >= 500 || *code == 429,
            // A content blob that came back short is worth another try
            TitleError::ContentFetch { .. } => true,
            TitleError::TmdNotFound { .. }
            | TitleError::TicketUnavailable { .. }
            | TitleError::CertChain(_)
            | TitleError::InvalidTmd(_)
            | TitleError::InvalidTicket(_)
            | TitleError::InvalidCertificate(_)
            | TitleError::Wad(_)
            | TitleError::Output { .. } => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or has been retried
/// `config.max_attempts` times
///
/// The first call is not a retry, so a transient failure costs at most
/// `max_attempts + 1` calls. Errors whose [`IsRetryable::is_retryable`] is
/// false are handed back after the first call.
pub async fn fetch_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);
    let mut retries = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(retries, "Recovered after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if retries >= config.max_attempts {
            tracing::debug!(error = %err, retries, "Giving up, retry budget spent");
            return Err(err);
        }

        retries += 1;
        let pause = backoff.next_pause();
        tracing::warn!(
            error = %err,
            retry = retries,
            of = config.max_attempts,
            pause_ms = pause.as_millis() as u64,
            "Transient failure, trying again"
        );
        tokio::time::sleep(pause).await;
    }
}

/// Pause schedule: starts at `initial_delay`, grows by `backoff_multiplier`
/// and never exceeds `max_delay` before jitter
struct Backoff<'a> {
    config: &'a RetryConfig,
    base: Duration,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            base: config.initial_delay.min(config.max_delay),
        }
    }

    fn next_pause(&mut self) -> Duration {
        let pause = self.base;
        self.base = Duration::try_from_secs_f64(pause.as_secs_f64() * self.config.backoff_multiplier)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay);
        if self.config.jitter {
            add_jitter(pause)
        } else {
            pause
        }
    }
}

/// Stretch `delay` by a random factor in `[1, 2)`
fn add_jitter(delay: Duration) -> Duration {
    let stretch: f64 = rand::thread_rng().r#gen();
    delay.mul_f64(1.0 + stretch)
}
