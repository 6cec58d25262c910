//! A stand-in for a vendor ad SDK.

use std::any::Any;
use std::time::Duration;

use adstock_service::inventory::{
    AdaptiveBannerSize, InventoryAsset, InventoryProvider, Payload, PayloadHandle, ProviderError,
    RenderError, Renderer, ResourceKind,
};
use futures::FutureExt;
use futures::future::BoxFuture;

/// Answers every fetch after a fixed latency, and fails a random share of them with
/// [`ProviderError::NoFill`].
#[derive(Debug, Clone, Copy)]
pub struct SyntheticProvider {
    latency: Duration,
    failure_rate: f64,
}

impl SyntheticProvider {
    /// `failure_rate` is clamped to `0.0..=1.0`.
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        Self {
            latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    fn respond(
        &self,
        payload: SyntheticPayload,
    ) -> BoxFuture<'static, Result<InventoryAsset, ProviderError>> {
        let latency = self.latency;
        let fails = rand::random::<f64>() < self.failure_rate;
        async move {
            tokio::time::sleep(latency).await;
            if fails {
                return Err(ProviderError::NoFill);
            }
            Ok(InventoryAsset::new(payload))
        }
        .boxed()
    }
}

impl InventoryProvider for SyntheticProvider {
    fn fetch(&self, kind: ResourceKind) -> BoxFuture<'static, Result<InventoryAsset, ProviderError>> {
        self.respond(SyntheticPayload { kind, width: None })
    }

    fn fetch_adaptive_banner(
        &self,
        size: AdaptiveBannerSize,
    ) -> BoxFuture<'static, Result<InventoryAsset, ProviderError>> {
        self.respond(SyntheticPayload {
            kind: ResourceKind::Banner,
            width: Some(size.width),
        })
    }
}

#[derive(Debug)]
struct SyntheticPayload {
    kind: ResourceKind,
    width: Option<u32>,
}

impl Payload for SyntheticPayload {
    fn release(self: Box<Self>) {
        tracing::trace!(kind = %self.kind, width = ?self.width, "Released synthetic payload");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// "Shows" assets by logging them.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(
        &self,
        kind: ResourceKind,
        payload: PayloadHandle,
    ) -> BoxFuture<'static, Result<(), RenderError>> {
        let result = match payload.downcast_ref::<SyntheticPayload>() {
            Some(synthetic) => {
                tracing::info!(%kind, width = ?synthetic.width, "Showing synthetic ad");
                Ok(())
            }
            None => Err(RenderError("not a synthetic payload".into())),
        };
        drop(payload);
        async move { result }.boxed()
    }
}
