//! Retry policy for page fetches.
//!
//! [`RetryFetch`] decorates any [`Fetch`] with exponential backoff and jitter.
//! Only transient failures (timeouts, dropped connections, 5xx) are retried;
//! a missing page or a PDF stays missing no matter how often we ask.
//!
//! # Backoff
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::error::FetchError;
use crate::fetch::{Fetch, FetchRequest};
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

pub struct RetryFetch<T> {
    inner: T,
    /// Extra attempts after the first one.
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: Fetch> RetryFetch<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    #[cfg(test)]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: Fetch> Fetch for RetryFetch<T> {
    #[instrument(level = "debug", skip_all, fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            let err = match self.inner.fetch(request).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if !err.is_transient() {
                return Err(err);
            }

            attempt += 1;
            if attempt > self.max_retries {
                error!(
                    attempt,
                    max = self.max_retries,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %err,
                    "fetch exhausted retries"
                );
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            warn!(
                attempt,
                max = self.max_retries,
                elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                ?delay,
                error = %err,
                "fetch attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// Fails with the given errors in order, then succeeds.
    struct Flaky {
        errors: Vec<FetchError>,
        calls: AtomicUsize,
    }

    impl Fetch for Flaky {
        async fn fetch(&self, _request: &FetchRequest) -> Result<String, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.errors.get(n) {
                Some(e) => Err(e.clone()),
                None => Ok("page".to_string()),
            }
        }
    }

    fn request() -> FetchRequest {
        FetchRequest {
            url: Url::parse("http://www.bestrace.com/2013schedule.html").unwrap(),
            form: None,
            timeout: Duration::from_secs(1),
        }
    }

    fn flaky(errors: Vec<FetchError>) -> RetryFetch<Flaky> {
        RetryFetch::new(
            Flaky {
                errors,
                calls: AtomicUsize::new(0),
            },
            2,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let f = flaky(vec![
            FetchError::Timeout("u".into()),
            FetchError::Transport("reset".into()),
        ]);
        assert_eq!(f.fetch(&request()).await.unwrap(), "page");
        assert_eq!(f.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let f = flaky(vec![FetchError::Timeout("u".into()); 5]);
        assert!(matches!(
            f.fetch(&request()).await,
            Err(FetchError::Timeout(_))
        ));
        assert_eq!(f.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_not_found() {
        let f = flaky(vec![FetchError::NotFound("u".into())]);
        assert!(matches!(
            f.fetch(&request()).await,
            Err(FetchError::NotFound(_))
        ));
        assert_eq!(f.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let f = flaky(vec![]);
        let f = RetryFetch {
            base_delay: Duration::from_secs(10),
            ..f
        };
        assert!(f.delay_for(10) <= Duration::from_millis(30_250));
        assert!(f.delay_for(1) >= Duration::from_secs(10));
    }
}
