use std::time::Duration;

use adstock_service::inventory::{
    AssetId, InventoryError, PreloadStatus, ProviderError, ResourceKind,
};

use crate::{MockProvider, RecordingRenderer, settle, setup_manager};

#[tokio::test(start_paused = true)]
async fn test_preload_fills_once() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Interstitial, &provider, |_| {});

    assert_eq!(manager.preload().await, Ok(PreloadStatus::Loaded));
    assert_eq!(manager.len(), 1);

    // a valid asset is resident, no need to fetch another one
    assert_eq!(manager.preload().await, Ok(PreloadStatus::StillValid));
    assert_eq!(manager.len(), 1);
    assert_eq!(provider.fetches(ResourceKind::Interstitial), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_preloads_are_single_flight() {
    let provider = MockProvider::with_latency(Duration::from_secs(1));
    let manager = setup_manager(ResourceKind::Native, &provider, |_| {});

    let (first, second, third) =
        futures::join!(manager.preload(), manager.preload(), manager.preload());

    assert_eq!(first, Ok(PreloadStatus::Loaded));
    assert_eq!(second, Ok(PreloadStatus::InProgress));
    assert_eq!(third, Ok(PreloadStatus::InProgress));
    assert_eq!(provider.fetches(ResourceKind::Native), 1);
    assert_eq!(manager.len(), 1);
    assert!(!manager.is_fetching());
}

#[tokio::test(start_paused = true)]
async fn test_preload_on_full_cache() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Banner, &provider, |config| {
        config.banner.capacity = Some(1);
    });

    assert_eq!(manager.preload().await, Ok(PreloadStatus::Loaded));
    assert_eq!(manager.preload().await, Ok(PreloadStatus::CacheFull));
    assert_eq!(provider.fetches(ResourceKind::Banner), 1);
}

#[tokio::test(start_paused = true)]
async fn test_preload_failure_allows_new_attempt() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Interstitial, &provider, |_| {});

    provider.fail_next(ProviderError::NoFill);
    assert_eq!(
        manager.preload().await,
        Err(InventoryError::ProviderFetchFailed("no fill".into()))
    );
    assert!(manager.is_empty());
    assert!(!manager.is_fetching());

    // nothing is retried automatically
    settle().await;
    assert_eq!(provider.fetches(ResourceKind::Interstitial), 1);

    assert_eq!(manager.preload().await, Ok(PreloadStatus::Loaded));
    assert_eq!(provider.fetches(ResourceKind::Interstitial), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_releases_guard() {
    let provider = MockProvider::gated();
    let manager = setup_manager(ResourceKind::Native, &provider, |config| {
        config.fetch_timeout = Duration::from_secs(2);
    });

    assert_eq!(
        manager.preload().await,
        Err(InventoryError::ProviderFetchFailed(
            "fetch timed out after 2s".into()
        ))
    );
    assert!(!manager.is_fetching());

    provider.open_gate(1);
    assert_eq!(manager.preload().await, Ok(PreloadStatus::Loaded));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_fetch_releases_guard() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Interstitial, &provider, |_| {});
    provider.panic_next();

    assert_eq!(manager.preload().await, Err(InventoryError::InternalError));
    assert!(!manager.is_fetching());
    assert_eq!(manager.len(), 0);

    assert_eq!(manager.preload().await, Ok(PreloadStatus::Loaded));
    assert_eq!(provider.fetches(ResourceKind::Interstitial), 2);
    assert_eq!(manager.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_hit_replenishes() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Interstitial, &provider, |_| {});
    manager.preload().await.unwrap();

    let asset = manager.get().await.unwrap();
    assert_eq!(asset.id(), &AssetId::new("interstitial-1"));
    assert_eq!(manager.len(), 0);

    // exactly one background preload per consumption
    settle().await;
    assert_eq!(manager.len(), 1);
    assert_eq!(provider.fetches(ResourceKind::Interstitial), 2);

    let next = manager.get().await.unwrap();
    assert_eq!(next.id(), &AssetId::new("interstitial-2"));
}

#[tokio::test(start_paused = true)]
async fn test_get_on_empty_cache_waits_for_fetch() {
    let provider = MockProvider::with_latency(Duration::from_secs(3));
    let manager = setup_manager(ResourceKind::Native, &provider, |_| {});

    let asset = manager.get().await.unwrap();
    assert_eq!(asset.id(), &AssetId::new("native-1"));
    assert_eq!(manager.len(), 0);

    // the replenish takes another 3 seconds
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(manager.len(), 1);
    assert_eq!(provider.fetches(ResourceKind::Native), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_gets_share_one_fetch() {
    let provider = MockProvider::with_latency(Duration::from_secs(1));
    let manager = setup_manager(ResourceKind::Banner, &provider, |_| {});

    let (first, second) = futures::join!(manager.get(), manager.get());

    // one asset was fetched, and it can only be handed out once
    assert_eq!(provider.fetches(ResourceKind::Banner), 1);
    assert_eq!(first.unwrap().id(), &AssetId::new("banner-1"));
    assert_eq!(second.unwrap_err(), InventoryError::AssetUnavailable);
}

#[tokio::test(start_paused = true)]
async fn test_get_timeout_keeps_fetch_running() {
    let provider = MockProvider::gated();
    let manager = setup_manager(ResourceKind::Interstitial, &provider, |config| {
        config.get_timeout = Duration::from_secs(5);
    });

    let start = tokio::time::Instant::now();
    assert_eq!(
        manager.get().await.unwrap_err(),
        InventoryError::AssetUnavailable
    );
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(manager.is_fetching());

    // the abandoned fetch still fills the cache
    provider.open_gate(2);
    settle().await;
    assert!(!manager.is_fetching());
    assert_eq!(manager.len(), 1);
    assert_eq!(provider.fetches(ResourceKind::Interstitial), 1);

    let asset = manager.get().await.unwrap();
    assert_eq!(asset.id(), &AssetId::new("interstitial-1"));
}

#[tokio::test(start_paused = true)]
async fn test_get_reports_provider_failure() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Native, &provider, |_| {});

    provider.fail_next(ProviderError::Request("network unreachable".into()));
    assert_eq!(
        manager.get().await.unwrap_err(),
        InventoryError::ProviderFetchFailed("network unreachable".into())
    );

    // nothing was consumed, so nothing is replenished
    settle().await;
    assert_eq!(provider.fetches(ResourceKind::Native), 1);
    assert!(manager.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_assets_are_consumed_once() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Banner, &provider, |_| {});
    manager.preload().await.unwrap();

    let first = manager.get().await.unwrap();
    settle().await;
    let second = manager.get().await.unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(provider.tracker().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ttl_expiry_releases_payload() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Interstitial, &provider, |_| {});
    manager.preload().await.unwrap();

    tokio::time::advance(Duration::from_secs(10 * 60) - Duration::from_millis(1)).await;
    assert_eq!(manager.valid_count(), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(manager.valid_count(), 0);
    // expiry is lazy
    assert_eq!(manager.len(), 1);
    assert_eq!(provider.tracker().count(), 0);

    assert_eq!(manager.sweep_expired(), 1);
    assert!(manager.is_empty());
    assert_eq!(
        provider.tracker().released(),
        vec![AssetId::new("interstitial-1")]
    );

    assert_eq!(manager.preload().await, Ok(PreloadStatus::Loaded));
}

#[tokio::test(start_paused = true)]
async fn test_get_skips_expired_assets() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Native, &provider, |config| {
        config.native.ttl = Some(Duration::from_secs(60));
    });
    manager.preload().await.unwrap();

    tokio::time::advance(Duration::from_secs(60)).await;
    let asset = manager.get().await.unwrap();

    assert_eq!(asset.id(), &AssetId::new("native-2"));
    assert_eq!(provider.tracker().released(), vec![AssetId::new("native-1")]);
}

#[tokio::test(start_paused = true)]
async fn test_clear_releases_and_keeps_fetch() {
    let provider = MockProvider::with_latency(Duration::from_secs(1));
    let manager = setup_manager(ResourceKind::Banner, &provider, |_| {});
    manager.preload().await.unwrap();

    assert_eq!(manager.clear(), 1);
    assert!(manager.is_empty());
    assert_eq!(provider.tracker().released(), vec![AssetId::new("banner-1")]);

    let preload = tokio::spawn({
        let manager = manager.clone();
        async move { manager.preload().await }
    });
    settle().await;
    assert!(manager.is_fetching());

    // clearing does not cancel the running fetch
    assert_eq!(manager.clear(), 0);
    assert_eq!(preload.await.unwrap(), Ok(PreloadStatus::Loaded));
    assert_eq!(manager.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_show_releases_payload() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Interstitial, &provider, |_| {});
    let renderer = RecordingRenderer::new();
    manager.preload().await.unwrap();

    let asset = manager.get().await.unwrap();
    let id = asset.id().clone();
    manager.show(asset, &renderer).await.unwrap();

    assert_eq!(
        renderer.shown(),
        vec![(ResourceKind::Interstitial, id.clone())]
    );
    assert_eq!(provider.tracker().releases_of(&id), 1);
}

#[tokio::test(start_paused = true)]
async fn test_show_render_failure() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Native, &provider, |_| {});
    let renderer = RecordingRenderer::new();
    renderer.fail();
    manager.preload().await.unwrap();

    let asset = manager.get().await.unwrap();
    let id = asset.id().clone();
    assert_eq!(
        manager.show(asset, &renderer).await,
        Err(InventoryError::RenderFailed("renderer failed".into()))
    );

    // the failed asset is released and never served again
    assert_eq!(provider.tracker().releases_of(&id), 1);
    settle().await;
    assert_ne!(manager.get().await.unwrap().id(), &id);
}

#[tokio::test(start_paused = true)]
async fn test_show_next() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Banner, &provider, |_| {});
    let renderer = RecordingRenderer::new();

    manager.show_next(&renderer).await.unwrap();
    assert_eq!(
        renderer.shown(),
        vec![(ResourceKind::Banner, AssetId::new("banner-1"))]
    );

    // provider failures surface as nothing being ready
    settle().await;
    manager.clear();
    provider.fail_next(ProviderError::NoFill);
    assert_eq!(
        manager.show_next(&renderer).await,
        Err(InventoryError::AssetUnavailable)
    );
    assert_eq!(renderer.shown().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_show_next_not_ready() {
    let provider = MockProvider::gated();
    let manager = setup_manager(ResourceKind::Interstitial, &provider, |config| {
        config.get_timeout = Duration::from_secs(1);
    });
    let renderer = RecordingRenderer::new();

    assert_eq!(
        manager.show_next(&renderer).await,
        Err(InventoryError::AssetUnavailable)
    );
    assert!(renderer.shown().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stats() {
    let provider = MockProvider::new();
    let manager = setup_manager(ResourceKind::Native, &provider, |_| {});
    manager.preload().await.unwrap();

    insta::assert_json_snapshot!(manager.stats(), @r###"
    {
      "kind": "native",
      "capacity": 2,
      "ttl": "15m",
      "size": 1,
      "valid": 1,
      "fetching": false
    }
    "###);
}
