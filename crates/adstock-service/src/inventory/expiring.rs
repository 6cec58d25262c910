use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use super::{CapacityExceeded, InventoryAsset, ResourceKind};
use crate::config::CachePolicy;

/// A bounded, time-aware container of [`InventoryAsset`]s for one [`ResourceKind`].
///
/// Items are kept in arrival order. The cache does not read the clock, every time dependent
/// operation takes `now` from the caller. Expiry is lazy: nothing is evicted until
/// [`sweep_expired`](Self::sweep_expired) runs, which [`take_valid`](Self::take_valid) does
/// implicitly.
///
/// Every asset removed without being handed out has its payload released.
#[derive(Debug)]
pub struct ExpiringCache {
    kind: ResourceKind,
    capacity: usize,
    ttl: Duration,
    items: VecDeque<InventoryAsset>,
}

impl ExpiringCache {
    pub fn new(kind: ResourceKind, policy: CachePolicy) -> Self {
        Self {
            kind,
            capacity: policy.capacity,
            ttl: policy.ttl,
            items: VecDeque::with_capacity(policy.capacity),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Removes and releases every item whose age is at least the TTL.
    ///
    /// Returns the number of removed items.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let before = self.items.len();
        let ttl = self.ttl;
        // dropping the asset releases its payload
        self.items.retain(|asset| !asset.is_expired(now, ttl));
        before - self.items.len()
    }

    /// Whether at least one non-expired item is resident.
    pub fn has_valid(&self, now: Instant) -> bool {
        self.items.iter().any(|asset| !asset.is_expired(now, self.ttl))
    }

    /// The number of non-expired resident items.
    pub fn valid_count(&self, now: Instant) -> usize {
        self.items
            .iter()
            .filter(|asset| !asset.is_expired(now, self.ttl))
            .count()
    }

    /// Sweeps, then removes and returns the oldest remaining item.
    pub fn take_valid(&mut self, now: Instant) -> Option<InventoryAsset> {
        self.sweep_expired(now);
        self.items.pop_front()
    }

    /// Appends `asset`, stamping it as created at `now`.
    ///
    /// A full cache rejects the asset and hands it back inside the error.
    pub fn insert(
        &mut self,
        mut asset: InventoryAsset,
        now: Instant,
    ) -> Result<(), CapacityExceeded> {
        if self.items.len() >= self.capacity {
            return Err(CapacityExceeded {
                kind: self.kind,
                capacity: self.capacity,
                asset,
            });
        }
        asset.set_created_at(now);
        self.items.push_back(asset);
        Ok(())
    }

    /// The number of resident items, expired or not.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes and releases all items regardless of their validity.
    ///
    /// Returns the number of removed items.
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }
}
