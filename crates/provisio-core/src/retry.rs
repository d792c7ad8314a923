use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::ProvisionError;

/// Wait schedule for the database-connect step, in seconds.
pub const DEFAULT_DB_RETRY_SECS: [u64; 8] = [10, 20, 30, 40, 50, 60, 70, 80];

/// Bounded retry schedule with monotonically non-decreasing delays.
///
/// A schedule of N delays allows at most N attempts. After failed attempt
/// `i` (1-based, not the last) the caller sleeps `delays[i - 1]`; a success
/// returns immediately without consuming the rest of the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    delays: Vec<Duration>,
}

impl Backoff {
    pub fn new(delays: Vec<Duration>) -> Result<Self, ProvisionError> {
        if delays.is_empty() {
            return Err(ProvisionError::InvalidConfig(
                "retry schedule must contain at least one delay".to_string(),
            ));
        }
        if delays.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(ProvisionError::InvalidConfig(
                "retry schedule must be non-decreasing".to_string(),
            ));
        }
        Ok(Self { delays })
    }

    pub fn from_secs(secs: &[u64]) -> Result<Self, ProvisionError> {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Run `op` until it succeeds, fails permanently, or the schedule runs out.
    ///
    /// `op` receives the 1-based attempt number. Only transient errors are
    /// retried; anything else is returned as-is on the spot. When every
    /// attempt failed transiently the last error is returned.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ProvisionError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, ProvisionError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "{what} succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.delays.len() => {
                    let delay = self.delays[attempt - 1];
                    warn!(
                        attempt,
                        max_attempts = self.delays.len(),
                        retry_in_secs = delay.as_secs(),
                        error = %err,
                        "{what} failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(attempt, error = %err, "{what} failed, giving up");
                    }
                    return Err(err);
                }
            }
        }
    }
}
