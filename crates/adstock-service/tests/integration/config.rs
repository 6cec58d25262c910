use std::time::Duration;

use adstock_service::config::Config;
use adstock_service::inventory::{CacheRegistry, ResourceKind};

use crate::MockProvider;

#[tokio::test]
async fn test_registry_from_config_file() {
    adstock_test::setup();
    let dir = adstock_test::tempdir();
    let path = adstock_test::write_config(
        dir.path(),
        r#"
inventory:
  interstitial:
    capacity: 1
  banner:
    ttl: 90s
  get_timeout: 2s
retry:
  max_attempts: 5
"#,
    );

    let config = Config::get(Some(path.as_path())).unwrap();
    assert_eq!(config.inventory.get_timeout, Duration::from_secs(2));
    assert_eq!(config.retry.max_attempts, 5);

    let provider = MockProvider::new();
    let registry = CacheRegistry::new(
        &config.inventory,
        provider,
        tokio::runtime::Handle::current(),
    );

    let stats = registry.stats();
    assert_eq!(stats[0].kind, ResourceKind::Interstitial);
    assert_eq!(stats[0].capacity, 1);
    assert_eq!(stats[0].ttl, Duration::from_secs(600));
    assert_eq!(stats[1].capacity, 2);
    assert_eq!(stats[2].ttl, Duration::from_secs(90));
}

#[test]
fn test_missing_config_file() {
    let dir = adstock_test::tempdir();
    assert!(Config::get(Some(dir.path().join("missing.yml").as_path())).is_err());
}
