//! Drives the caches with a steady stream of ad requests.

use std::collections::BTreeMap;
use std::time::Duration;

use adstock_service::inventory::{CacheRegistry, InventoryError, KindStats, ResourceKind};
use futures::future;
use serde::Serialize;

use crate::synthetic::LogRenderer;

/// What happened to the requests of one kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindOutcome {
    /// Requests that got an asset, which was then shown.
    pub served: usize,
    /// Requests that found no asset within the `get` timeout.
    pub unavailable: usize,
    /// Requests that failed because the provider failed, or the asset could not be rendered.
    pub failed: usize,
}

impl KindOutcome {
    fn record(&mut self, result: &Result<(), InventoryError>) {
        match result {
            Ok(()) => self.served += 1,
            Err(InventoryError::AssetUnavailable) => self.unavailable += 1,
            Err(_) => self.failed += 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub rounds: usize,
    pub outcomes: BTreeMap<ResourceKind, KindOutcome>,
    pub stats: Vec<KindStats>,
}

/// Runs `rounds` rounds of one ad request per kind, pausing `interval` between rounds.
///
/// All kinds are requested concurrently within a round. Every asset that is obtained is shown
/// right away.
pub async fn simulate(
    registry: &CacheRegistry,
    rounds: usize,
    interval: Duration,
) -> SimulationReport {
    let renderer = LogRenderer;
    let mut outcomes: BTreeMap<_, KindOutcome> = ResourceKind::ALL
        .into_iter()
        .map(|kind| (kind, KindOutcome::default()))
        .collect();

    for round in 0..rounds {
        if round > 0 {
            tokio::time::sleep(interval).await;
        }

        let requests = registry.managers().map(|manager| {
            let renderer = &renderer;
            async move {
                let result = match manager.get().await {
                    Ok(asset) => manager.show(asset, renderer).await,
                    Err(error) => Err(error),
                };
                (manager.kind(), result)
            }
        });

        for (kind, result) in future::join_all(requests).await {
            if let Err(error) = &result {
                tracing::info!(
                    %kind,
                    round,
                    error = error as &dyn std::error::Error,
                    "Ad request not served"
                );
            }
            outcomes.entry(kind).or_default().record(&result);
        }
    }

    SimulationReport {
        rounds,
        outcomes,
        stats: registry.stats(),
    }
}
