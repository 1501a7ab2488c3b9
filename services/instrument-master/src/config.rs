//! Service configuration
//!
//! Defaults cover the TradeSmart feeds. A TOML file and `INSTRUMENT_MASTER__*`
//! environment variables override them, e.g.
//! `INSTRUMENT_MASTER__REFRESH__INTERVAL_SECS=3600`.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::feeds::breeze::BREEZE_SECURITY_MASTER_URL;
use crate::feeds::noren::{NOREN_SYMBOLS_BASE_URL, symbols_url};
use crate::feeds::{FeedKind, FeedSpec};
use crate::instruments::normalizer::SymbolConvention;
use crate::instruments::store::DEFAULT_STALE_AFTER_FAILURES;
use crate::instruments::types::{UnderlyingMatch, Venue};

const ENV_PREFIX: &str = "INSTRUMENT_MASTER";

/// Refresh scheduling and retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Spawn the periodic refresh task on start
    pub enable_auto_updates: bool,
    /// Seconds between scheduled refreshes
    pub interval_secs: u64,
    /// Retries after the first failed attempt of a refresh
    pub max_retries: u32,
    /// Initial backoff, doubled after every failure
    pub retry_delay_secs: u64,
    /// Upper bound on a single backoff
    pub max_retry_delay_secs: u64,
    /// Failed refreshes in a row before results carry a stale advisory
    pub stale_after_failures: u32,
    /// Snapshot age after which results carry a stale advisory; 0 disables
    pub max_snapshot_age_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enable_auto_updates: true,
            interval_secs: 24 * 3600,
            max_retries: 3,
            retry_delay_secs: 5,
            max_retry_delay_secs: 60,
            stale_after_failures: DEFAULT_STALE_AFTER_FAILURES,
            max_snapshot_age_secs: 2 * 24 * 3600,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn max_snapshot_age(&self) -> Option<Duration> {
        (self.max_snapshot_age_secs > 0).then(|| Duration::from_secs(self.max_snapshot_age_secs))
    }

    /// Backoff before retry number `attempt` (1-based), capped
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1_u64 << attempt.saturating_sub(1).min(16);
        Duration::from_secs(
            self.retry_delay_secs
                .saturating_mul(factor)
                .min(self.max_retry_delay_secs),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentMasterConfig {
    /// Archives fetched on every refresh
    pub feeds: Vec<FeedSpec>,
    /// Combined CSV written after each refresh and read on start
    pub cache_path: Option<PathBuf>,
    /// HTTP timeout per download
    pub http_timeout_secs: u64,
    pub refresh: RefreshConfig,
    pub underlying_match: UnderlyingMatch,
    pub symbol_convention: SymbolConvention,
}

impl Default for InstrumentMasterConfig {
    fn default() -> Self {
        Self {
            feeds: default_noren_feeds(),
            cache_path: Some(PathBuf::from("./data/instruments/combined_instruments.csv")),
            http_timeout_secs: 30,
            refresh: RefreshConfig::default(),
            underlying_match: UnderlyingMatch::default(),
            symbol_convention: SymbolConvention::default(),
        }
    }
}

/// One archive per venue from the TradeSmart symbol server
pub fn default_noren_feeds() -> Vec<FeedSpec> {
    Venue::ALL
        .iter()
        .map(|venue| FeedSpec::new(FeedKind::Noren, symbols_url(NOREN_SYMBOLS_BASE_URL, *venue)))
        .collect()
}

/// The ICICI Direct security master
pub fn breeze_feed() -> FeedSpec {
    FeedSpec::new(FeedKind::Breeze, BREEZE_SECURITY_MASTER_URL)
}

impl InstrumentMasterConfig {
    /// Load from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to read instrument master configuration")?;

        let config: Self = settings
            .try_deserialize()
            .context("Invalid instrument master configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// One service instance serves one broker: every feed must share a
    /// vendor layout, otherwise tokens and trading symbols of different
    /// brokers would compete for the same contract.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.feeds.first() else {
            bail!("No instrument feeds configured");
        };
        if let Some(other) = self.feeds.iter().find(|f| f.kind != first.kind) {
            bail!(
                "Feeds mix {:?} and {:?} layouts ({}); configure one broker per service",
                first.kind,
                other.kind,
                other.url
            );
        }
        Ok(())
    }

    /// Vendor layout shared by all configured feeds
    pub fn feed_kind(&self) -> Option<FeedKind> {
        self.feeds.first().map(|f| f.kind)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
