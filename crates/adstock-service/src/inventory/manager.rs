use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use sentry::{Hub, SentryFutureExt};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::Instant;

use super::{
    ExpiringCache, InventoryAsset, InventoryError, InventoryProvider, ProviderError, Renderer,
    ResourceKind,
};
use crate::config::InventoryConfig;
use crate::utils::defer::defer;

type FetchResult = Result<(), InventoryError>;

/// The in-flight fetch of a manager, awaitable by any number of callers.
type InFlightFetch = Shared<BoxFuture<'static, FetchResult>>;

/// The outcome of a successful [`InventoryManager::preload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreloadStatus {
    /// A fresh asset was fetched and inserted.
    Loaded,
    /// Another fetch is already running, nothing was started.
    InProgress,
    /// The cache holds as many assets as it may, nothing was started.
    CacheFull,
    /// The cache still holds a servable asset, nothing was started.
    StillValid,
}

/// A point-in-time view of one manager, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub kind: ResourceKind,
    pub capacity: usize,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Resident assets, including ones that expired but were not swept yet.
    pub size: usize,
    /// Resident assets that may still be served.
    pub valid: usize,
    /// Whether a fetch is currently running.
    pub fetching: bool,
}

/// What [`InventoryManager::admit`] decided for a fetch request.
enum Admission {
    InProgress(InFlightFetch),
    Started(InFlightFetch),
    CacheFull,
    StillValid,
}

struct ManagerState {
    cache: ExpiringCache,
    /// The single-flight guard, tagged with the id of the fetch that owns it.
    in_flight: Option<(u64, InFlightFetch)>,
    next_fetch_id: u64,
}

impl ManagerState {
    /// Releases the single-flight guard if it still belongs to fetch `id`.
    fn finish(&mut self, id: u64) {
        if matches!(self.in_flight, Some((current, _)) if current == id) {
            self.in_flight = None;
        }
    }
}

struct ManagerInner {
    kind: ResourceKind,
    get_timeout: Duration,
    fetch_timeout: Duration,
    provider: Arc<dyn InventoryProvider>,
    runtime: Handle,
    state: Mutex<ManagerState>,
}

impl ManagerInner {
    /// Locks the state.
    ///
    /// The state stays consistent across panics of other lock holders, as every mutation is a
    /// single call into the cache, so poisoning is ignored.
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweep(&self, cache: &mut ExpiringCache, now: Instant) -> usize {
        let expired = cache.sweep_expired(now);
        if expired > 0 {
            metric!(counter("inventory.expired") += expired as i64, "kind" => self.kind.as_ref());
            tracing::debug!(kind = %self.kind, expired, "Evicted expired inventory");
        }
        expired
    }

    /// Stores the result of fetch `id` and releases the single-flight guard.
    ///
    /// Both happen under one lock, so no caller can observe a finished fetch that is still
    /// marked as running.
    fn complete_fetch(
        &self,
        id: u64,
        result: Result<InventoryAsset, ProviderError>,
    ) -> FetchResult {
        let kind = self.kind;
        let mut state = self.state();
        state.finish(id);

        let asset = match result {
            Ok(asset) => asset,
            Err(error) => {
                metric!(counter("inventory.fetch.failure") += 1, "kind" => kind.as_ref());
                tracing::debug!(
                    %kind,
                    error = &error as &dyn std::error::Error,
                    "Inventory fetch failed"
                );
                return Err(error.into());
            }
        };

        let asset_id = asset.id().clone();
        match state.cache.insert(asset, Instant::now()) {
            Ok(()) => {
                metric!(gauge("inventory.size") = state.cache.len() as u64, "kind" => kind.as_ref());
                tracing::debug!(%kind, asset = %asset_id, "Inventory asset loaded");
            }
            Err(rejected) => {
                // the asset is released when `rejected` goes out of scope
                metric!(counter("inventory.fetch.rejected") += 1, "kind" => kind.as_ref());
                tracing::warn!(
                    %kind,
                    asset = %asset_id,
                    error = &rejected as &dyn std::error::Error,
                    "Discarding fetched inventory"
                );
            }
        }
        Ok(())
    }
}

/// Serves the assets of one [`ResourceKind`] and keeps its [`ExpiringCache`] stocked.
///
/// At most one provider fetch per manager is outstanding at any time. Callers that need an
/// asset while a fetch is running join that fetch instead of starting another one.
/// Every consumed asset schedules a background [`preload`](Self::preload) to replenish the
/// cache.
///
/// Fetches run on the I/O runtime and are never cancelled by callers: a caller that gives up
/// waiting leaves the result to the next one.
///
/// Cloning is cheap and yields a handle to the same manager.
#[derive(Clone)]
pub struct InventoryManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for InventoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InventoryManager");
        debug.field("kind", &self.inner.kind);
        if let Ok(state) = self.inner.state.try_lock() {
            debug
                .field("size", &state.cache.len())
                .field("fetching", &state.in_flight.is_some());
        }
        debug.finish_non_exhaustive()
    }
}

impl InventoryManager {
    /// Creates the manager for `kind`, running fetches on `runtime`.
    pub fn new(
        kind: ResourceKind,
        config: &InventoryConfig,
        provider: Arc<dyn InventoryProvider>,
        runtime: Handle,
    ) -> Self {
        let cache = ExpiringCache::new(kind, config.policy(kind));
        let inner = ManagerInner {
            kind,
            get_timeout: config.get_timeout,
            fetch_timeout: config.fetch_timeout,
            provider,
            runtime,
            state: Mutex::new(ManagerState {
                cache,
                in_flight: None,
                next_fetch_id: 0,
            }),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.kind
    }

    /// Makes sure the cache holds a servable asset, fetching one if needed.
    ///
    /// This is a no-op if a fetch is already running, the cache is full, or it still holds a
    /// valid asset. Otherwise a fetch is started and awaited.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::ProviderFetchFailed`] if the provider fails. Nothing is
    /// retried, the caller may invoke `preload` again.
    pub async fn preload(&self) -> Result<PreloadStatus, InventoryError> {
        match self.admit() {
            Admission::InProgress(_) => Ok(PreloadStatus::InProgress),
            Admission::CacheFull => Ok(PreloadStatus::CacheFull),
            Admission::StillValid => Ok(PreloadStatus::StillValid),
            Admission::Started(fetch) => fetch.await.map(|()| PreloadStatus::Loaded),
        }
    }

    /// Takes an asset out of the cache, fetching one if the cache is empty.
    ///
    /// A returned asset is never handed out again, and always schedules exactly one
    /// background [`preload`](Self::preload).
    ///
    /// On an empty cache this waits for the running fetch (or starts one), bounded by the
    /// configured `get_timeout`.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::AssetUnavailable`] if the timeout elapsed, or the fetched asset was
    ///   taken by a concurrent caller. The fetch keeps running and fills the cache.
    /// - [`InventoryError::ProviderFetchFailed`] if the awaited fetch failed.
    pub async fn get(&self) -> Result<InventoryAsset, InventoryError> {
        let kind = self.kind();
        metric!(counter("inventory.access") += 1, "kind" => kind.as_ref());

        if let Some(asset) = self.take() {
            metric!(counter("inventory.hit") += 1, "kind" => kind.as_ref());
            self.replenish();
            return Ok(asset);
        }

        let fetch = match self.admit() {
            Admission::InProgress(fetch) | Admission::Started(fetch) => fetch,
            // filled concurrently since `take`
            Admission::CacheFull | Admission::StillValid => return self.take_and_replenish(),
        };

        match tokio::time::timeout(self.inner.get_timeout, fetch).await {
            Err(_) => {
                metric!(counter("inventory.get.timeout") += 1, "kind" => kind.as_ref());
                tracing::debug!(%kind, timeout = ?self.inner.get_timeout, "Gave up waiting for inventory");
                Err(InventoryError::AssetUnavailable)
            }
            Ok(Err(error)) => Err(error),
            Ok(Ok(())) => self.take_and_replenish(),
        }
    }

    /// Hands a consumed asset to the `renderer`.
    ///
    /// The asset is consumed whatever the outcome and never goes back into the cache.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::RenderFailed`] if the renderer could not display it.
    pub async fn show(
        &self,
        asset: InventoryAsset,
        renderer: &dyn Renderer,
    ) -> Result<(), InventoryError> {
        let kind = self.kind();
        let asset_id = asset.id().clone();

        let result = renderer
            .render(kind, asset.into_payload())
            .await
            .map_err(InventoryError::from);
        metric!(
            counter("inventory.show") += 1,
            "kind" => kind.as_ref(),
            "status" => result.as_ref().err().map_or("shown", InventoryError::metrics_tag),
        );

        match result {
            Ok(()) => {
                tracing::debug!(%kind, asset = %asset_id, "Inventory shown and dismissed");
                Ok(())
            }
            Err(error) => {
                tracing::debug!(
                    %kind,
                    asset = %asset_id,
                    error = &error as &dyn std::error::Error,
                    "Failed to render inventory"
                );
                Err(error)
            }
        }
    }

    /// [`get`](Self::get)s an asset and [`show`](Self::show)s it.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::AssetUnavailable`] when no asset is ready, or
    /// [`InventoryError::RenderFailed`] from rendering.
    pub async fn show_next(&self, renderer: &dyn Renderer) -> Result<(), InventoryError> {
        let kind = self.kind();
        let asset = match self.get().await {
            Ok(asset) => asset,
            Err(error) => {
                let not_ready = InventoryError::AssetUnavailable;
                metric!(
                    counter("inventory.show") += 1,
                    "kind" => kind.as_ref(),
                    "status" => not_ready.metrics_tag(),
                );
                tracing::debug!(
                    %kind,
                    error = &error as &dyn std::error::Error,
                    "No inventory ready to show"
                );
                return Err(not_ready);
            }
        };
        self.show(asset, renderer).await
    }

    /// Removes and releases every resident asset.
    ///
    /// A running fetch is not cancelled, its asset is inserted once it completes.
    pub fn clear(&self) -> usize {
        let kind = self.kind();
        let removed = self.inner.state().cache.clear();
        metric!(gauge("inventory.size") = 0u64, "kind" => kind.as_ref());
        tracing::debug!(%kind, removed, "Cleared inventory");
        removed
    }

    /// Evicts expired assets right away, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut state = self.inner.state();
        self.inner.sweep(&mut state.cache, Instant::now())
    }

    /// The number of resident assets, including expired ones that were not swept yet.
    pub fn len(&self) -> usize {
        self.inner.state().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of resident assets that may still be served.
    pub fn valid_count(&self) -> usize {
        self.inner.state().cache.valid_count(Instant::now())
    }

    /// Whether a fetch is currently running.
    pub fn is_fetching(&self) -> bool {
        self.inner.state().in_flight.is_some()
    }

    pub fn stats(&self) -> KindStats {
        let state = self.inner.state();
        KindStats {
            kind: self.kind(),
            capacity: state.cache.capacity(),
            ttl: state.cache.ttl(),
            size: state.cache.len(),
            valid: state.cache.valid_count(Instant::now()),
            fetching: state.in_flight.is_some(),
        }
    }

    /// Decides whether a fetch is needed, and starts it if so.
    ///
    /// The checks and the start happen under one lock, which makes the guard single-flight.
    fn admit(&self) -> Admission {
        let mut state = self.inner.state();
        if let Some((_, fetch)) = &state.in_flight {
            return Admission::InProgress(fetch.clone());
        }

        let now = Instant::now();
        self.inner.sweep(&mut state.cache, now);
        // capacity applies to everything resident, not only to valid assets
        if state.cache.len() >= state.cache.capacity() {
            return Admission::CacheFull;
        }
        if state.cache.has_valid(now) {
            return Admission::StillValid;
        }

        let id = state.next_fetch_id;
        state.next_fetch_id += 1;
        let fetch = self.spawn_fetch(id);
        state.in_flight = Some((id, fetch.clone()));
        Admission::Started(fetch)
    }

    /// Spawns fetch `id` on the I/O runtime.
    ///
    /// The fetch is bounded by `fetch_timeout`, so a provider that never answers cannot hold
    /// the single-flight guard forever.
    fn spawn_fetch(&self, id: u64) -> InFlightFetch {
        let kind = self.kind();
        metric!(counter("inventory.fetch") += 1, "kind" => kind.as_ref());
        tracing::trace!(%kind, fetch = id, "Spawning inventory fetch");

        let inner = Arc::clone(&self.inner);
        let task = async move {
            // releases the guard should the provider panic
            let _guard = {
                let inner = Arc::clone(&inner);
                defer(move || inner.state().finish(id))
            };

            let timeout = inner.fetch_timeout;
            let result = match tokio::time::timeout(timeout, inner.provider.fetch(kind)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout)),
            };
            inner.complete_fetch(id, result)
        };

        let handle = self
            .inner
            .runtime
            .spawn(task.bind_hub(Hub::new_from_top(Hub::current())));

        async move {
            handle
                .await
                .unwrap_or_else(|error| Err(InventoryError::from_join_error(error)))
        }
        .boxed()
        .shared()
    }

    fn take(&self) -> Option<InventoryAsset> {
        let mut state = self.inner.state();
        let now = Instant::now();
        self.inner.sweep(&mut state.cache, now);
        let asset = state.cache.take_valid(now);
        if asset.is_some() {
            metric!(gauge("inventory.size") = state.cache.len() as u64, "kind" => self.kind().as_ref());
        }
        asset
    }

    fn take_and_replenish(&self) -> Result<InventoryAsset, InventoryError> {
        let asset = self.take().ok_or(InventoryError::AssetUnavailable)?;
        self.replenish();
        Ok(asset)
    }

    /// Schedules a background [`preload`](Self::preload) after a consumption.
    fn replenish(&self) {
        let kind = self.kind();
        metric!(counter("inventory.replenish") += 1, "kind" => kind.as_ref());

        let this = self.clone();
        let task = async move {
            match this.preload().await {
                Ok(status) => tracing::trace!(%kind, ?status, "Replenished inventory"),
                Err(error) => tracing::debug!(
                    %kind,
                    error = &error as &dyn std::error::Error,
                    "Failed to replenish inventory"
                ),
            }
        };
        self.inner
            .runtime
            .spawn(task.bind_hub(Hub::new_from_top(Hub::current())));
    }
}
