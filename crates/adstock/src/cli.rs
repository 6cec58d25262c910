//! Exposes the command line application.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adstock_service::config::Config;
use adstock_service::inventory::CacheRegistry;
use adstock_service::metrics;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::runtime::{Builder, Runtime};

use crate::logging;
use crate::simulate::simulate;
use crate::synthetic::SyntheticProvider;

/// Options for the synthetic provider.
#[derive(Clone, Copy, Debug, Args)]
struct ProviderArgs {
    /// How long every synthetic fetch takes, e.g. `250ms`.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "200ms")]
    latency: Duration,

    /// The share of synthetic fetches that report no fill, between 0 and 1.
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,
}

impl ProviderArgs {
    fn provider(&self) -> SyntheticProvider {
        SyntheticProvider::new(self.latency, self.failure_rate)
    }
}

/// Adstock commands.
#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Request ads from all caches at a steady pace and print the outcome as JSON.
    Simulate {
        /// The number of request rounds.
        #[arg(long, default_value_t = 20)]
        requests: usize,

        /// The pause between two rounds, e.g. `1s`.
        #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
        interval: Duration,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Preload all caches once and print their state as JSON.
    Stats {
        #[command(flatten)]
        provider: ProviderArgs,
    },
}

/// Keeps ad inventory stocked ahead of time.
///
/// Capacities, TTLs and timeouts are read from the configuration file. All commands run
/// against a synthetic provider.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: We are still single-threaded at this point.
    unsafe { logging::init_logging(&config) };
    if let Some(ref statsd) = config.metrics.statsd {
        let hostname = config.metrics.hostname_tag.clone().and_then(|tag| {
            hostname::get()
                .ok()
                .and_then(|s| s.into_string().ok())
                .map(|name| (tag, name))
        });
        let environment = config.metrics.environment_tag.clone().and_then(|tag| {
            sentry
                .options()
                .environment
                .as_ref()
                .map(|name| (tag, name.to_string()))
        });
        let tags: BTreeMap<_, _> = config
            .metrics
            .custom_tags
            .clone()
            .into_iter()
            .chain(hostname)
            .chain(environment)
            .collect();
        metrics::configure_statsd(&config.metrics.prefix, statsd.as_str(), tags)
            .context("failed to configure statsd")?;
    }

    let runtimes = Runtimes::new()?;
    match cli.command {
        Command::Simulate {
            requests,
            interval,
            provider,
        } => {
            let registry = runtimes.registry(&config, provider.provider());
            let _sweeper = registry.spawn_sweeper();
            let report = runtimes
                .main
                .block_on(simulate(&registry, requests, interval));
            print_json(&report)?;
        }
        Command::Stats { provider } => {
            let registry = runtimes.registry(&config, provider.provider());
            let results = runtimes.main.block_on(registry.preload_all());
            for (kind, result) in results {
                if let Err(error) = result {
                    tracing::warn!(
                        %kind,
                        error = &error as &dyn std::error::Error,
                        "Failed to preload inventory"
                    );
                }
            }
            print_json(&registry.stats())?;
        }
    }

    Ok(())
}

/// The I/O pool that runs all provider fetches, and the runtime driving the commands.
struct Runtimes {
    io: Runtime,
    main: Runtime,
}

impl Runtimes {
    fn new() -> Result<Self> {
        let io = Builder::new_multi_thread()
            .thread_name("adstock-io")
            .enable_all()
            .build()
            .context("failed to create the I/O runtime")?;
        let main = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to create the main runtime")?;
        Ok(Self { io, main })
    }

    fn registry(&self, config: &Config, provider: SyntheticProvider) -> CacheRegistry {
        CacheRegistry::new(
            &config.inventory,
            Arc::new(provider),
            self.io.handle().to_owned(),
        )
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}
