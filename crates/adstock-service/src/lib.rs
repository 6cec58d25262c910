//! The ad-inventory cache.
//!
//! Keeps a small, bounded, time-limited supply of opaque inventory assets per
//! [`ResourceKind`](inventory::ResourceKind), fetched from an external
//! [`InventoryProvider`](inventory::InventoryProvider) and replenished in the background every
//! time an asset is consumed. See the [`inventory`] module for how the pieces fit together.

#[macro_use]
pub mod metrics;

pub mod config;
pub mod inventory;
pub mod logging;
pub mod retry;
pub mod utils;
