use std::time::Duration;

use thiserror::Error;

use super::{InventoryAsset, ResourceKind};

/// An error surfaced by the inventory caches.
///
/// Errors are plain values so they can be handed to every caller waiting on the same fetch.
/// The cache never retries on its own; see [`crate::retry`] for a caller side policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// The provider could not produce an asset.
    ///
    /// The attached string contains the provider's error message.
    #[error("provider fetch failed: {0}")]
    ProviderFetchFailed(String),
    /// No asset could be produced within the configured timeout.
    #[error("no asset available")]
    AssetUnavailable,
    /// The renderer could not display a consumed asset.
    #[error("render failed: {0}")]
    RenderFailed(String),
    /// The fetch task was lost before reporting a result.
    #[error("internal error")]
    InternalError,
}

impl From<ProviderError> for InventoryError {
    fn from(error: ProviderError) -> Self {
        Self::ProviderFetchFailed(error.to_string())
    }
}

impl From<RenderError> for InventoryError {
    fn from(error: RenderError) -> Self {
        Self::RenderFailed(error.0)
    }
}

impl InventoryError {
    /// A short, stable name used to tag metrics.
    pub fn metrics_tag(&self) -> &'static str {
        match self {
            Self::ProviderFetchFailed(_) => "fetchfailed",
            Self::AssetUnavailable => "unavailable",
            Self::RenderFailed(_) => "renderfailed",
            Self::InternalError => "internalerror",
        }
    }

    #[track_caller]
    pub(crate) fn from_join_error(error: tokio::task::JoinError) -> Self {
        let dynerr: &dyn std::error::Error = &error; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr, "inventory fetch task was lost");
        Self::InternalError
    }
}

/// An error reported by an [`InventoryProvider`](super::InventoryProvider) for a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider had no inventory to fill the request with.
    #[error("no fill")]
    NoFill,
    /// The request failed, for example because of a network problem.
    ///
    /// The attached string contains the vendor's message.
    #[error("{0}")]
    Request(String),
    /// The provider did not answer in time.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// The reason a [`Renderer`](super::Renderer) failed to display a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// An insert into a full [`ExpiringCache`](super::ExpiringCache).
///
/// The rejected asset is handed back, so the caller decides what happens to its payload.
#[derive(Debug, Error)]
#[error("{kind} cache is at capacity ({capacity})")]
pub struct CapacityExceeded {
    pub kind: ResourceKind,
    pub capacity: usize,
    pub asset: InventoryAsset,
}
