//! Bounded retry for transient SQLite contention

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{EngineError, Result};

/// Run `op` until it succeeds, fails permanently, or `config.max_attempts` is reached
///
/// Only errors classified by [`EngineError::is_transient`] are retried. Each
/// attempt must be a complete unit of work (a fresh transaction), so a retry
/// never observes half of a previous attempt.
pub async fn retry_transient<T, F, Fut>(config: &RetryConfig, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Err(e) if e.is_transient() => {
                if attempt >= config.max_attempts {
                    warn!("🔁 {} still contended after {} attempts: {}", operation, attempt, e);
                    return Err(EngineError::Contention(operation.to_string()));
                }
                let delay = backoff_delay(config, attempt);
                debug!("🔁 {} hit contention (attempt {}), retrying in {:?}", operation, attempt, delay);
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// Exponential delay capped at `max_delay_ms`, jittered into its upper half
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config
        .base_delay_ms
        .saturating_mul(1u64 << (attempt - 1).min(16))
        .min(config.max_delay_ms);
    let jittered = if exp == 0 {
        0
    } else {
        rand::thread_rng().gen_range(exp / 2..=exp)
    };
    Duration::from_millis(jittered)
}
