use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Capped exponential backoff with full jitter. Only ever applied to
/// idempotent reads; the debit path performs exactly one attempt.
pub(crate) struct RetryPolicy {
    pub(crate) attempts: u32,
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn backoff_cap(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1_u32 << attempt.min(16))
            .min(self.max_delay)
    }
}

pub(crate) async fn retry_idempotent<T, E, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.attempts {
                    warn!("{label}: giving up after {attempt} attempts: {err}");
                    return Err(err);
                }

                let cap_ms = policy.backoff_cap(attempt).as_millis() as u64;
                let delay = Duration::from_millis(rand::thread_rng().gen_range(0..=cap_ms));
                warn!(
                    "{label}: attempt {attempt} failed: {err}, retrying in {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
