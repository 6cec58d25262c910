use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::{InventoryAsset, ProviderError, ResourceKind};

/// The requested size of an adaptive banner.
///
/// Adaptive banners are sized to the space available at the call site, which is why they are
/// never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdaptiveBannerSize {
    /// Available width in density independent pixels.
    pub width: u32,
}

/// The external source of inventory, usually an adapter over a vendor ad SDK.
///
/// Each call is a single attempt: implementations must not retry internally. The returned
/// futures are `'static` so they can be driven on the I/O runtime independently of the caller.
pub trait InventoryProvider: Send + Sync + 'static {
    /// Fetches one asset for a cached placement kind.
    fn fetch(&self, kind: ResourceKind) -> BoxFuture<'static, Result<InventoryAsset, ProviderError>>;

    /// Fetches a banner sized for the given width.
    fn fetch_adaptive_banner(
        &self,
        size: AdaptiveBannerSize,
    ) -> BoxFuture<'static, Result<InventoryAsset, ProviderError>>;
}
