//! Retry logic with exponential backoff
//!
//! Transfers are retried by a bounded loop that walks an explicit state
//! machine: `Attempting → (Backoff → Attempting)* → Succeeded | Failed`.
//! Only errors classified as transient by [`IsRetryable`] move the machine into
//! `Backoff`; everything else fails on the spot.
//!
//! ```no_run
//! use photon_updater::config::RetryConfig;
//! use photon_updater::retry::download_with_retry;
//!
//! # async fn example(client: reqwest::Client) -> photon_updater::Result<()> {
//! let retry = RetryConfig::default();
//! let client = &client;
//! let checksum = download_with_retry(&retry, || async move {
//!     let response = client.get("https://example.com/photon.md5").send().await?;
//!     Ok::<_, photon_updater::Error>(response.error_for_status()?.text().await?)
//! })
//! .await?;
//! println!("{checksum}");
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Transient or permanent classification of a failure
///
/// Transport hiccups (timeouts, resets, 5xx, 429) are transient. A short
/// transfer, missing disk space or a bad checksum never gets better by
/// asking again.
pub trait IsRetryable {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => match e.status() {
                // Server-side trouble or throttling may clear up on its own
                Some(status) => status.is_server_error() || status.as_u16() == 429,
                None => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            },
            // Socket-level I/O errors surfaced while streaming
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Short transfers keep their checkpoint and are resumed by a later run
            Error::Download(_) => false,
            Error::PostProcess(_) => false,
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            // Disk space errors need operator action
            Error::InsufficientSpace { .. } => false,
            Error::ExternalTool(_) => false,
            Error::NotSupported(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// Position of the retry loop
#[derive(Debug)]
enum RetryState<T, E> {
    /// Running the operation for the given 1-based attempt
    Attempting { attempt: u32 },
    /// Waiting before the next attempt
    Backoff { attempt: u32, delay: Duration, error: E },
    /// The operation produced a value
    Succeeded { attempts: u32, value: T },
    /// The operation failed permanently or ran out of attempts
    Failed { attempts: u32, error: E },
}

/// Delay to wait after the given failed attempt (1-based)
///
/// Grows as `initial_delay * backoff_multiplier^(attempt - 1)`, capped at
/// `max_delay`. With the defaults this yields 1s, 2s, 4s, ...
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    let delay = if secs.is_finite() {
        Duration::from_secs_f64(secs).min(config.max_delay)
    } else {
        config.max_delay
    };

    if config.jitter { add_jitter(delay) } else { delay }
}

/// Run `operation` until it succeeds, fails permanently or runs out of attempts
///
/// `max_attempts` counts every attempt including the first; 0 is treated as 1.
/// Waits between attempts follow [`backoff_delay`].
pub async fn download_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut state = RetryState::Attempting { attempt: 1 };

    loop {
        state = match state {
            RetryState::Attempting { attempt } => match operation().await {
                Ok(value) => RetryState::Succeeded {
                    attempts: attempt,
                    value,
                },
                Err(error) if error.is_retryable() && attempt < max_attempts => RetryState::Backoff {
                    attempt,
                    delay: backoff_delay(config, attempt),
                    error,
                },
                Err(error) => RetryState::Failed {
                    attempts: attempt,
                    error,
                },
            },
            RetryState::Backoff {
                attempt,
                delay,
                error,
            } => {
                tracing::warn!(
                    error = %error,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                tracing::info!(
                    attempt = attempt + 1,
                    max_attempts,
                    "retrying (attempt {}/{})",
                    attempt + 1,
                    max_attempts
                );
                RetryState::Attempting {
                    attempt: attempt + 1,
                }
            }
            RetryState::Succeeded { attempts, value } => {
                if attempts > 1 {
                    tracing::info!(attempts, "operation succeeded after retry");
                }
                return Ok(value);
            }
            RetryState::Failed { attempts, error } => {
                if error.is_retryable() {
                    tracing::error!(
                        error = %error,
                        attempts,
                        "operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %error, "operation failed with non-retryable error");
                }
                return Err(error);
            }
        };
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    delay.mul_f64(factor)
}
