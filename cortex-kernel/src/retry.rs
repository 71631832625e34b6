//! Exponential-backoff retry wrapper with a context tag.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Tuning for [`retry`].
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Retries after the first attempt. 0 means exactly one attempt.
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Tag included in every attempt log line.
    pub context: String,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            context: String::new(),
        }
    }
}

impl RetryOptions {
    /// Options with a context tag and defaults otherwise.
    #[must_use]
    pub fn tagged(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            ..Self::default()
        }
    }

    /// Set the retry count.
    #[must_use]
    pub fn retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the base delay.
    #[must_use]
    pub fn base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }
}

/// A successful result plus how many attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    /// The operation's value.
    pub value: T,
    /// Total attempts made (1 = first try succeeded).
    pub attempts: u32,
}

/// Run `op` until it succeeds or retries are exhausted, sleeping
/// `min(base_delay · 2^attempt, max_delay)` between attempts. The last
/// error is returned unchanged. The closure receives the zero-based
/// attempt number.
pub async fn retry<T, E, F, Fut>(opts: &RetryOptions, mut op: F) -> Result<Retried<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempt + 1,
                });
            }
            Err(e) if attempt >= opts.max_retries => {
                tracing::warn!(
                    context = %opts.context,
                    attempts = attempt + 1,
                    error = %e,
                    "giving up after final attempt"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = opts
                    .base_delay
                    .saturating_mul(1u32 << attempt.min(16))
                    .min(opts.max_delay);
                tracing::debug!(
                    context = %opts.context,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let opts = RetryOptions::tagged("test").retries(0);
        let calls2 = Arc::clone(&calls);
        let result: Result<Retried<()>, String> = retry(&opts, move |_| {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_later_attempt_with_count() {
        let opts = RetryOptions::tagged("test").retries(3);
        let result = retry(&opts, |attempt| async move {
            if attempt < 2 {
                Err("not yet".to_string())
            } else {
                Ok(attempt)
            }
        })
        .await
        .unwrap();
        assert_eq!(result.attempts, 3);
        assert_eq!(result.value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_capped() {
        // 250ms * 2^20 would overflow the cap wildly; the clamp keeps
        // each sleep at max_delay so the paused clock finishes fast.
        let opts = RetryOptions {
            max_retries: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(1),
            context: "cap".into(),
        };
        let start = tokio::time::Instant::now();
        let result: Result<Retried<()>, String> =
            retry(&opts, |_| async { Err("always".to_string()) }).await;
        assert!(result.is_err());
        // 250 + 500 + 1000 + 1000 + 1000 = 3750ms ceiling.
        assert!(start.elapsed() <= Duration::from_millis(3800));
    }

    #[tokio::test]
    async fn last_error_is_returned() {
        let opts = RetryOptions::tagged("test").retries(1).base_delay(Duration::from_millis(1));
        let err = retry::<(), _, _, _>(&opts, |attempt| async move {
            Err(format!("failure {attempt}"))
        })
        .await
        .unwrap_err();
        assert_eq!(err, "failure 1");
    }
}
