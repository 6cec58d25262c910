//! Caller-side retries for failed preloads.
//!
//! The managers never retry on their own. Callers that want to keep trying to warm up a cache
//! after a provider failure can use [`preload_with_backoff`].

use std::time::Duration;

use crate::config::RetryConfig;
use crate::inventory::{InventoryError, InventoryManager, PreloadStatus};

/// The delay to wait after failed attempt number `attempt` (starting at 1).
///
/// Starts at `initial_delay` and doubles with every attempt, capped at `max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    config
        .initial_delay
        .checked_mul(1 << exponent)
        .map_or(config.max_delay, |delay| delay.min(config.max_delay))
}

/// Preloads `manager`, retrying provider failures with exponential backoff.
///
/// Only [`InventoryError::ProviderFetchFailed`] is retried, any other outcome is returned
/// right away. After `max_attempts` the last error is returned.
pub async fn preload_with_backoff(
    manager: &InventoryManager,
    config: &RetryConfig,
) -> Result<PreloadStatus, InventoryError> {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = manager.preload().await;

        let should_retry = matches!(result, Err(InventoryError::ProviderFetchFailed(_)));
        if !should_retry || attempt >= max_attempts {
            break result;
        }

        let delay = backoff_delay(config, attempt);
        tracing::debug!(
            kind = %manager.kind(),
            attempt,
            ?delay,
            "Retrying failed inventory preload"
        );
        tokio::time::sleep(delay).await;
    }
}
