use std::any::Any;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// An opaque, vendor-owned piece of displayable content.
///
/// Payloads usually wrap a native resource of the ad SDK that has to be freed explicitly.
/// [`release`](Self::release) consumes the box, so it can run at most once. It is invoked by
/// [`PayloadHandle`] when the payload is evicted, cleared, or dropped by a renderer.
pub trait Payload: Send + 'static {
    /// Frees the resources held by this payload.
    ///
    /// This may run while a cache lock is held, so it must not call back into an
    /// [`InventoryManager`](super::InventoryManager).
    fn release(self: Box<Self>) {}

    /// Gives renderers access to the concrete vendor type.
    fn as_any(&self) -> &dyn Any;
}

/// Exclusive ownership of a [`Payload`].
///
/// The payload is released exactly once: either through [`release`](Self::release), or when
/// the handle is dropped.
pub struct PayloadHandle {
    inner: Option<Box<dyn Payload>>,
}

impl PayloadHandle {
    pub fn new<P: Payload>(payload: P) -> Self {
        Self {
            inner: Some(Box::new(payload)),
        }
    }

    /// Returns the payload as `T`, if it is one and was not released yet.
    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        self.inner.as_ref()?.as_any().downcast_ref()
    }

    /// Whether the payload was already released.
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    /// Releases the payload now. Further calls are no-ops.
    pub fn release(&mut self) {
        if let Some(payload) = self.inner.take() {
            payload.release();
        }
    }

    /// Takes the payload out of the handle without releasing it.
    ///
    /// Releasing it is now the responsibility of the caller.
    pub fn into_inner(mut self) -> Option<Box<dyn Payload>> {
        self.inner.take()
    }
}

impl Drop for PayloadHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for PayloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadHandle")
            .field("released", &self.is_released())
            .finish()
    }
}

/// The unique id of an [`InventoryAsset`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a fresh random id, for providers that do not assign one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of fetched ad content.
#[derive(Debug)]
pub struct InventoryAsset {
    id: AssetId,
    payload: PayloadHandle,
    /// Stamped by [`ExpiringCache::insert`](super::ExpiringCache::insert).
    created_at: Instant,
}

impl InventoryAsset {
    /// Wraps a payload with a generated id.
    pub fn new<P: Payload>(payload: P) -> Self {
        Self::with_id(AssetId::generate(), payload)
    }

    /// Wraps a payload with a vendor assigned id.
    pub fn with_id<P: Payload>(id: AssetId, payload: P) -> Self {
        Self {
            id,
            payload: PayloadHandle::new(payload),
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &AssetId {
        &self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn set_created_at(&mut self, now: Instant) {
        self.created_at = now;
    }

    pub fn payload(&self) -> &PayloadHandle {
        &self.payload
    }

    /// Consumes the asset, handing out ownership of its payload.
    pub fn into_payload(self) -> PayloadHandle {
        self.payload
    }

    /// Whether this asset is stale at `now`. An age of exactly `ttl` counts as stale.
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= ttl
    }
}
