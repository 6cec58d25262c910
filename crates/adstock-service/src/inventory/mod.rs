//! The inventory caches.
//!
//! # Layers
//!
//! The caching is split into three layers, from the bottom up:
//!
//! - [`ExpiringCache`] is a plain bounded FIFO of [`InventoryAsset`]s with a per-kind TTL. It
//!   does not read the clock or do any I/O, and is only ever used behind a lock.
//! - [`InventoryManager`] owns one [`ExpiringCache`] and talks to the [`InventoryProvider`].
//!   It guarantees that at most one fetch per kind is running (single-flight), lets concurrent
//!   callers join that fetch, and schedules a background refill every time an asset is
//!   consumed.
//! - [`CacheRegistry`] holds one manager per [`ResourceKind`] and exposes the uncached
//!   adaptive banner path.
//!
//! # Payload lifecycle
//!
//! Every asset wraps a vendor [`Payload`] that has to be released exactly once. Ownership
//! always lives in a [`PayloadHandle`]: an asset that expires, is cleared, is rejected because
//! the cache is full, or is dropped after rendering releases its payload when the handle is
//! dropped. Once an asset has been handed out by [`InventoryManager::get`] the cache forgets
//! about it.
//!
//! # Expiry
//!
//! Expiry is lazy. Expired assets are evicted whenever a cache is accessed, and additionally on
//! an interval if `sweep_interval` is configured, see [`CacheRegistry::spawn_sweeper`]. An
//! asset is expired once its age reaches the TTL of its kind.
//!
//! # Metrics
//!
//! All metrics carry a `kind` tag:
//!
//! - `inventory.access`: Number of `get` calls.
//! - `inventory.hit`: `get` calls served straight from the cache.
//! - `inventory.fetch`: Provider fetches that were started.
//! - `inventory.fetch.failure`: Provider fetches that failed or timed out.
//! - `inventory.fetch.rejected`: Fetched assets discarded because the cache was full.
//! - `inventory.expired`: Assets evicted because their TTL elapsed.
//! - `inventory.get.timeout`: `get` calls that gave up waiting for a fetch.
//! - `inventory.replenish`: Background preloads scheduled after a consumption.
//! - `inventory.show`: Render attempts, tagged with their `status`.
//! - `inventory.size` (gauge): Resident assets after an insert, take or clear.

mod asset;
mod error;
mod expiring;
mod kind;
mod manager;
mod provider;
mod registry;
mod render;

pub use asset::{AssetId, InventoryAsset, Payload, PayloadHandle};
pub use error::{CapacityExceeded, InventoryError, ProviderError, RenderError};
pub use expiring::ExpiringCache;
pub use kind::ResourceKind;
pub use manager::{InventoryManager, KindStats, PreloadStatus};
pub use provider::{AdaptiveBannerSize, InventoryProvider};
pub use registry::CacheRegistry;
pub use render::Renderer;
