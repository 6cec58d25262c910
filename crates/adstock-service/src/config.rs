use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, Serialize, de};
use tracing::level_filters::LevelFilter;

use crate::inventory::ResourceKind;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for adstock.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A tag name to report the hostname to, for each metric. Defaults to not sending such a tag.
    pub hostname_tag: Option<String>,
    /// A tag name to report the environment to, for each metric. Defaults to not sending such a tag.
    pub environment_tag: Option<String>,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "adstock".into(),
            hostname_tag: None,
            environment_tag: None,
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Overrides for the cache of a single [`ResourceKind`].
///
/// Unset values fall back to the defaults of the kind, see [`ResourceKind::default_capacity`]
/// and [`ResourceKind::default_ttl`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct KindConfig {
    /// Maximum number of resident assets.
    pub capacity: Option<usize>,
    /// How long a fetched asset may be served after it was inserted.
    #[serde(with = "humantime_serde")]
    pub ttl: Option<Duration>,
}

/// The resolved capacity and TTL of one cache.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct CachePolicy {
    pub capacity: usize,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct InventoryConfig {
    /// Interstitial placements.
    pub interstitial: KindConfig,
    /// Native-content placements.
    pub native: KindConfig,
    /// Default-sized banner placements.
    pub banner: KindConfig,

    /// How long `get` waits for a fetch before giving up on an empty cache.
    ///
    /// Giving up does not cancel the fetch, it will still populate the cache.
    #[serde(with = "humantime_serde")]
    pub get_timeout: Duration,

    /// Upper bound for a single provider fetch.
    ///
    /// A fetch that exceeds this is reported as failed, which releases the single-flight guard
    /// for the next attempt.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Interval of the optional background expiry sweep.
    ///
    /// By default expired assets are only swept when a cache is accessed.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            interstitial: KindConfig::default(),
            native: KindConfig::default(),
            banner: KindConfig::default(),
            get_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(30),
            sweep_interval: None,
        }
    }
}

impl InventoryConfig {
    /// Resolves the cache policy of `kind`, applying configured overrides.
    pub fn policy(&self, kind: ResourceKind) -> CachePolicy {
        let overrides = match kind {
            ResourceKind::Interstitial => &self.interstitial,
            ResourceKind::Native => &self.native,
            ResourceKind::Banner => &self.banner,
        };
        CachePolicy {
            capacity: overrides.capacity.unwrap_or(kind.default_capacity()),
            ttl: overrides.ttl.unwrap_or(kind.default_ttl()),
        }
    }

    /// Checks that every cache can hold at least one asset for a non-zero time.
    ///
    /// A zero capacity or TTL makes every fetched asset unusable, while still hitting the
    /// provider on every request.
    pub fn validate(&self) -> Result<()> {
        for kind in ResourceKind::ALL {
            let policy = self.policy(kind);
            if policy.capacity == 0 {
                anyhow::bail!("inventory.{kind}.capacity must be at least 1");
            }
            if policy.ttl.is_zero() {
                anyhow::bail!("inventory.{kind}.ttl must not be zero");
            }
        }
        Ok(())
    }
}

/// Backoff for callers that want to retry failed preloads.
///
/// See [`preload_with_backoff`](crate::retry::preload_with_backoff).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt. Doubles for every further attempt.
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound for the delay between two attempts.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// Capacity, TTL and timeouts of the inventory caches.
    pub inventory: InventoryConfig,

    /// Backoff used by callers retrying failed preloads.
    pub retry: RetryConfig,
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        let config: Self = serde_yaml::from_str(&config).context("failed to parse config YAML")?;
        config.inventory.validate().context("invalid inventory config")?;
        Ok(config)
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}
