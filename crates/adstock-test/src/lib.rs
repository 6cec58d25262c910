//! Helpers for testing the inventory caches.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Tests that depend on TTLs or timeouts should run with a paused clock
//!    (`#[tokio::test(start_paused = true)]`) and move time with `tokio::time::advance`. The
//!    caches read [`tokio::time::Instant`], so they follow the paused clock.
//!
//!  - [`MockProvider`] hands out assets with a [`TrackedPayload`]. Every release of such a
//!    payload is recorded in the provider's [`ReleaseTracker`], which is how tests check that
//!    nothing leaks and nothing is released twice.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

use adstock_service::inventory::{
    AdaptiveBannerSize, AssetId, InventoryAsset, InventoryProvider, Payload, PayloadHandle,
    ProviderError, RenderError, Renderer, ResourceKind,
};

pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `adstock_service` crate and mutes
///    all other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("adstock_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// Writes `yaml` to a `config.yml` file in `dir` and returns its path.
pub fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("config.yml");
    std::fs::write(&path, yaml).unwrap();
    path
}

/// Records the ids of released [`TrackedPayload`]s.
#[derive(Clone, Debug, Default)]
pub struct ReleaseTracker(Arc<Mutex<Vec<AssetId>>>);

impl ReleaseTracker {
    /// Creates an asset with the given id, whose payload reports to this tracker.
    pub fn asset(&self, id: impl Into<String>) -> InventoryAsset {
        let id = AssetId::new(id);
        let payload = TrackedPayload {
            id: id.clone(),
            tracker: self.clone(),
        };
        InventoryAsset::with_id(id, payload)
    }

    /// All released ids, in release order.
    pub fn released(&self) -> Vec<AssetId> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// How often the payload with `id` was released.
    pub fn releases_of(&self, id: &AssetId) -> usize {
        self.0.lock().unwrap().iter().filter(|r| *r == id).count()
    }
}

/// A payload that records its release.
#[derive(Debug)]
pub struct TrackedPayload {
    id: AssetId,
    tracker: ReleaseTracker,
}

impl TrackedPayload {
    pub fn id(&self) -> &AssetId {
        &self.id
    }
}

impl Payload for TrackedPayload {
    fn release(self: Box<Self>) {
        self.tracker.0.lock().unwrap().push(self.id);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A scriptable [`InventoryProvider`].
///
/// Assets are named `<kind>-<n>`, where `n` counts the fetches of that kind starting at 1.
/// Adaptive banners are named `adaptive-<width>-<n>`.
#[derive(Debug, Default)]
pub struct MockProvider {
    tracker: ReleaseTracker,
    fetches: Mutex<BTreeMap<ResourceKind, usize>>,
    adaptive_fetches: Mutex<Vec<u32>>,
    failures: Mutex<VecDeque<ProviderError>>,
    panics: Mutex<usize>,
    latency: Duration,
    gate: Option<Arc<Semaphore>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A provider whose fetches all take `latency`.
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Default::default()
        })
    }

    /// A provider whose fetches block until [`open_gate`](Self::open_gate) is called.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Default::default()
        })
    }

    /// Lets `fetches` blocked or future fetches complete.
    ///
    /// # Panics
    ///
    /// Panics if the provider was not created with [`gated`](Self::gated).
    pub fn open_gate(&self, fetches: usize) {
        self.gate
            .as_ref()
            .expect("provider is not gated")
            .add_permits(fetches);
    }

    /// Makes the next fetch fail with `error`. Calls queue up.
    pub fn fail_next(&self, error: ProviderError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Makes the next fetch panic while it is being polled. Calls queue up.
    pub fn panic_next(&self) {
        *self.panics.lock().unwrap() += 1;
    }

    /// The tracker that all payloads of this provider report to.
    pub fn tracker(&self) -> &ReleaseTracker {
        &self.tracker
    }

    /// The number of fetches started for `kind`.
    pub fn fetches(&self, kind: ResourceKind) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    /// The widths of all adaptive banner fetches.
    pub fn adaptive_fetches(&self) -> Vec<u32> {
        self.adaptive_fetches.lock().unwrap().clone()
    }

    fn respond(&self, id: String) -> BoxFuture<'static, Result<InventoryAsset, ProviderError>> {
        let panics = {
            let mut panics = self.panics.lock().unwrap();
            let panics_now = *panics > 0;
            *panics = panics.saturating_sub(1);
            panics_now
        };
        let failure = self.failures.lock().unwrap().pop_front();
        let tracker = self.tracker.clone();
        let gate = self.gate.clone();
        let latency = self.latency;

        async move {
            if let Some(gate) = gate {
                gate.acquire_owned().await.unwrap().forget();
            }
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if panics {
                panic!("provider panicked while fetching {id}");
            }
            match failure {
                Some(error) => Err(error),
                None => Ok(tracker.asset(id)),
            }
        }
        .boxed()
    }
}

impl InventoryProvider for MockProvider {
    fn fetch(&self, kind: ResourceKind) -> BoxFuture<'static, Result<InventoryAsset, ProviderError>> {
        let n = {
            let mut fetches = self.fetches.lock().unwrap();
            let count = fetches.entry(kind).or_default();
            *count += 1;
            *count
        };
        self.respond(format!("{kind}-{n}"))
    }

    fn fetch_adaptive_banner(
        &self,
        size: AdaptiveBannerSize,
    ) -> BoxFuture<'static, Result<InventoryAsset, ProviderError>> {
        let n = {
            let mut fetches = self.adaptive_fetches.lock().unwrap();
            fetches.push(size.width);
            fetches.len()
        };
        self.respond(format!("adaptive-{}-{n}", size.width))
    }
}

/// A [`Renderer`] that records what it was asked to show.
///
/// The payload is dropped, and thereby released, before the render future resolves.
#[derive(Clone, Debug, Default)]
pub struct RecordingRenderer {
    shown: Arc<Mutex<Vec<(ResourceKind, AssetId)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes all further renders fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// The kind and id of every payload passed to the renderer.
    pub fn shown(&self) -> Vec<(ResourceKind, AssetId)> {
        self.shown.lock().unwrap().clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render(
        &self,
        kind: ResourceKind,
        payload: PayloadHandle,
    ) -> BoxFuture<'static, Result<(), RenderError>> {
        let id = payload
            .downcast_ref::<TrackedPayload>()
            .map(|payload| payload.id().clone())
            .unwrap_or_else(|| AssetId::new("<untracked>"));
        self.shown.lock().unwrap().push((kind, id));
        drop(payload);

        let result = if self.failing.load(Ordering::SeqCst) {
            Err(RenderError("renderer failed".into()))
        } else {
            Ok(())
        };
        async move { result }.boxed()
    }
}
