use std::time::Duration;

use adstock_service::config::RetryConfig;
use adstock_service::inventory::{InventoryError, PreloadStatus, ProviderError, ResourceKind};
use adstock_service::retry::preload_with_backoff;
use tokio::time::Instant;

use crate::{MockProvider, setup_manager};

fn retry_config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
    }
}

#[tokio::test(start_paused = true)]
async fn test_retries_until_loaded() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Interstitial, &provider, |_| {});
    provider.fail_next(ProviderError::NoFill);
    provider.fail_next(ProviderError::Request("network unreachable".into()));

    let start = Instant::now();
    let result = preload_with_backoff(&manager, &retry_config(3)).await;

    assert_eq!(result, Ok(PreloadStatus::Loaded));
    assert_eq!(provider.fetches(ResourceKind::Interstitial), 3);
    // waited 1s and then 2s
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Native, &provider, |_| {});
    for _ in 0..3 {
        provider.fail_next(ProviderError::NoFill);
    }

    let result = preload_with_backoff(&manager, &retry_config(2)).await;

    assert_eq!(
        result,
        Err(InventoryError::ProviderFetchFailed("no fill".into()))
    );
    assert_eq!(provider.fetches(ResourceKind::Native), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_without_failure() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Banner, &provider, |_| {});
    manager.preload().await.unwrap();

    let start = Instant::now();
    let result = preload_with_backoff(&manager, &retry_config(3)).await;

    assert_eq!(result, Ok(PreloadStatus::StillValid));
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(provider.fetches(ResourceKind::Banner), 1);
}
