use std::sync::Arc;
use std::time::Duration;

use adstock_service::config::InventoryConfig;
use adstock_service::inventory::{CacheRegistry, InventoryManager, ResourceKind};

pub use adstock_test::{MockProvider, RecordingRenderer};

/// Setup tests and create the manager for `kind`.
///
/// The `update_config` closure can modify the default configuration before the manager is
/// created. Fetches run on the runtime of the test.
pub fn setup_manager(
    kind: ResourceKind,
    provider: &Arc<MockProvider>,
    update_config: impl FnOnce(&mut InventoryConfig),
) -> InventoryManager {
    adstock_test::setup();

    let mut config = InventoryConfig::default();
    update_config(&mut config);

    let handle = tokio::runtime::Handle::current();
    InventoryManager::new(kind, &config, provider.clone(), handle)
}

/// Setup tests and create a registry of all managers.
pub fn setup_registry(
    provider: &Arc<MockProvider>,
    update_config: impl FnOnce(&mut InventoryConfig),
) -> CacheRegistry {
    adstock_test::setup();

    let mut config = InventoryConfig::default();
    update_config(&mut config);

    let handle = tokio::runtime::Handle::current();
    CacheRegistry::new(&config, provider.clone(), handle)
}

/// Lets all spawned background work that is not waiting on a timer run to completion.
///
/// With a paused clock this advances time by a single millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
