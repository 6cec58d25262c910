use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use sentry::{Hub, SentryFutureExt};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{
    AdaptiveBannerSize, InventoryAsset, InventoryError, InventoryManager, InventoryProvider,
    KindStats, PreloadStatus, ProviderError, ResourceKind,
};
use crate::config::InventoryConfig;

/// Owns one [`InventoryManager`] per [`ResourceKind`] and the uncached adaptive banner path.
///
/// Construct this once at startup and hand out references to it. There are no invariants
/// across kinds, every manager is fully independent.
pub struct CacheRegistry {
    interstitial: InventoryManager,
    native: InventoryManager,
    banner: InventoryManager,
    provider: Arc<dyn InventoryProvider>,
    runtime: Handle,
    fetch_timeout: Duration,
    sweep_interval: Option<Duration>,
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("interstitial", &self.interstitial)
            .field("native", &self.native)
            .field("banner", &self.banner)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl CacheRegistry {
    /// Creates all managers, running their fetches on `runtime`.
    pub fn new(
        config: &InventoryConfig,
        provider: Arc<dyn InventoryProvider>,
        runtime: Handle,
    ) -> Self {
        let manager = |kind| {
            InventoryManager::new(kind, config, Arc::clone(&provider), runtime.clone())
        };

        Self {
            interstitial: manager(ResourceKind::Interstitial),
            native: manager(ResourceKind::Native),
            banner: manager(ResourceKind::Banner),
            provider: Arc::clone(&provider),
            runtime: runtime.clone(),
            fetch_timeout: config.fetch_timeout,
            sweep_interval: config.sweep_interval,
        }
    }

    pub fn manager(&self, kind: ResourceKind) -> &InventoryManager {
        match kind {
            ResourceKind::Interstitial => &self.interstitial,
            ResourceKind::Native => &self.native,
            ResourceKind::Banner => &self.banner,
        }
    }

    pub fn interstitial(&self) -> &InventoryManager {
        &self.interstitial
    }

    pub fn native(&self) -> &InventoryManager {
        &self.native
    }

    pub fn banner(&self) -> &InventoryManager {
        &self.banner
    }

    /// All managers, in the order of [`ResourceKind::ALL`].
    pub fn managers(&self) -> impl Iterator<Item = &InventoryManager> {
        ResourceKind::ALL.into_iter().map(|kind| self.manager(kind))
    }

    /// Fetches a fresh banner sized for `size`.
    ///
    /// Adaptive banners depend on the call site and are never cached: every call is a new
    /// provider fetch, bounded by `fetch_timeout`.
    pub async fn adaptive_banner(
        &self,
        size: AdaptiveBannerSize,
    ) -> Result<InventoryAsset, InventoryError> {
        metric!(counter("inventory.fetch") += 1, "kind" => "adaptive_banner");
        let timeout = self.fetch_timeout;
        let fetch = self.provider.fetch_adaptive_banner(size);
        let job = async move {
            tokio::time::timeout(timeout, fetch)
                .await
                .unwrap_or(Err(ProviderError::Timeout(timeout)))
        };
        let handle = self
            .runtime
            .spawn(job.bind_hub(Hub::new_from_top(Hub::current())));

        let result = match handle.await {
            Ok(result) => result.map_err(InventoryError::from),
            Err(error) => Err(InventoryError::from_join_error(error)),
        };
        if let Err(error) = &result {
            metric!(counter("inventory.fetch.failure") += 1, "kind" => "adaptive_banner");
            tracing::debug!(
                width = size.width,
                error = error as &dyn std::error::Error,
                "Adaptive banner fetch failed"
            );
        }
        result
    }

    /// Warms up every cache concurrently.
    pub async fn preload_all(&self) -> Vec<(ResourceKind, Result<PreloadStatus, InventoryError>)> {
        let preloads = self
            .managers()
            .map(|manager| async move { (manager.kind(), manager.preload().await) });
        future::join_all(preloads).await
    }

    /// The number of resident assets of `kind`, including unswept expired ones.
    pub fn len(&self, kind: ResourceKind) -> usize {
        self.manager(kind).len()
    }

    /// The number of servable assets of `kind`.
    pub fn valid_count(&self, kind: ResourceKind) -> usize {
        self.manager(kind).valid_count()
    }

    /// Removes and releases every asset of `kind`.
    pub fn clear(&self, kind: ResourceKind) -> usize {
        self.manager(kind).clear()
    }

    pub fn clear_all(&self) -> usize {
        self.managers().map(InventoryManager::clear).sum()
    }

    pub fn stats(&self) -> Vec<KindStats> {
        self.managers().map(InventoryManager::stats).collect()
    }

    /// Spawns a task that sweeps expired assets of all kinds on the configured interval.
    ///
    /// Returns `None` when no `sweep_interval` is configured, in which case expiry only
    /// happens on access. Abort the returned handle to stop sweeping.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let interval = self.sweep_interval.filter(|interval| !interval.is_zero())?;
        let managers: Vec<_> = self.managers().cloned().collect();

        tracing::info!(?interval, "Starting background inventory sweeper");
        let task = async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for manager in &managers {
                    manager.sweep_expired();
                }
            }
        };
        Some(self.runtime.spawn(task))
    }
}
