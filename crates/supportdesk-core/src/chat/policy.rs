//! Bounded retry and timeout for store calls.
//!
//! Every attempt runs under `tokio::time::timeout`; transient failures are
//! retried with linear backoff up to `attempts` total tries. Conflicts and
//! missing rows are returned immediately.

use std::future::Future;
use std::time::Duration;

use supportdesk_types::config::StorePolicyConfig;
use supportdesk_types::error::RepositoryError;
use tracing::warn;

/// Retry/timeout policy applied to each store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self::from(&StorePolicyConfig::default())
    }
}

impl From<&StorePolicyConfig> for StorePolicy {
    fn from(config: &StorePolicyConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            timeout: config.timeout(),
            backoff: config.backoff(),
        }
    }
}

impl StorePolicy {
    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` names the call in log output.
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(RepositoryError::Timeout(self.timeout)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(op, attempt, attempts, error = %err, "store call failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
