//! Instrument master service with scheduled refresh
//!
//! Owns the shared store and performs the only slow work in the crate:
//! downloading vendor archives, decoding them and publishing a new
//! snapshot. Lookups never wait on a refresh.

use anyhow::Context;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, error, info, warn};

use super::cache;
use super::normalizer::SymbolNormalizer;
use super::resolver::{InstrumentResolver, ResolveRequest, ResolvedInstrument};
use super::store::{SecurityMaster, SecurityMasterStore, StaleData};
use super::types::{InstrumentRecord, TokenKind, Venue};
use crate::config::InstrumentMasterConfig;
use crate::error::FeedError;
use crate::feeds::{FeedKind, FeedSpec, ingest_archive};

/// A lookup result plus the staleness advisory of the snapshot it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lookup<T> {
    pub value: T,
    pub stale: Option<StaleData>,
}

/// Outcome of a successful refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub instruments: usize,
    pub rejected: usize,
    pub venues: Vec<(Venue, usize)>,
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct InstrumentMasterService {
    config: InstrumentMasterConfig,
    source: FeedKind,
    store: Arc<SecurityMasterStore>,
    resolver: InstrumentResolver,
    normalizer: SymbolNormalizer,
    client: Client,
    refresh_lock: Arc<Mutex<()>>,
}

impl InstrumentMasterService {
    /// Fails on configurations that mix brokers' feeds
    pub fn new(config: InstrumentMasterConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let source = config
            .feed_kind()
            .context("No instrument feeds configured")?;
        let client = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        let store = Arc::new(
            SecurityMasterStore::new(config.refresh.stale_after_failures)
                .with_max_age(config.refresh.max_snapshot_age()),
        );

        Ok(Self {
            resolver: InstrumentResolver::new(config.underlying_match),
            normalizer: SymbolNormalizer::new(config.symbol_convention),
            config,
            source,
            store,
            client,
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn config(&self) -> &InstrumentMasterConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SecurityMasterStore> {
        &self.store
    }

    pub fn normalizer(&self) -> &SymbolNormalizer {
        &self.normalizer
    }

    /// Load the cached snapshot, refresh when nothing is loaded or the
    /// cache is older than the refresh interval, and spawn the periodic
    /// refresh task when enabled.
    ///
    /// Fails only when no snapshot could be obtained at all.
    pub async fn start(&self) -> anyhow::Result<Option<JoinHandle<()>>> {
        info!("Starting instrument master service...");

        self.load_cache().await;

        let snapshot = self.store.current();
        if snapshot.is_empty() {
            info!("Fetching instruments on startup...");
            if let Err(e) = self.refresh_now().await {
                error!("Initial instrument fetch failed: {}", e);
                return Err(anyhow::anyhow!("No instrument data available: {e}"));
            }
        } else if self.refresh_due(&snapshot) {
            info!(
                "Cached instruments retrieved at {:?} are due for refresh",
                snapshot.retrieved_at()
            );
            if let Err(e) = self.refresh_now().await {
                warn!("Startup refresh failed, serving cached instruments: {}", e);
            }
        }

        let handle = self
            .config
            .refresh
            .enable_auto_updates
            .then(|| self.spawn_background_refresh());

        info!("Instrument master service started");
        Ok(handle)
    }

    async fn load_cache(&self) {
        let Some(path) = self.config.cache_path.clone() else {
            return;
        };
        let cache_display = path.display().to_string();
        let source = self.source;

        match task::spawn_blocking(move || cache::read_snapshot(&path, source)).await {
            Ok(Ok(Some(snapshot))) if !snapshot.is_empty() => {
                self.store.load(snapshot);
            }
            Ok(Ok(_)) => debug!("No cached instruments at {}", cache_display),
            Ok(Err(e)) => warn!("Failed to load instrument cache: {:#}", e),
            Err(e) => warn!("Instrument cache reader failed: {}", e),
        }
    }

    /// Snapshot without a retrieval time, or at least one interval old
    fn refresh_due(&self, snapshot: &SecurityMaster) -> bool {
        snapshot
            .age()
            .is_none_or(|age| age >= self.config.refresh.interval())
    }

    /// Time left until the current snapshot is one interval old
    fn next_refresh_delay(&self) -> Duration {
        let period = self.config.refresh.interval();
        let age = self.store.current().age().unwrap_or(period);
        period.saturating_sub(age)
    }

    /// Periodic refresh loop. The first run is due one interval after the
    /// current snapshot was retrieved. Abort the handle to stop it.
    pub fn spawn_background_refresh(&self) -> JoinHandle<()> {
        let service = self.clone();
        let period = self.config.refresh.interval();
        let first = self.next_refresh_delay();
        debug!("Next instrument refresh in {:?}", first);

        tokio::spawn(async move {
            let mut ticker = interval_at(time::Instant::now() + first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                info!("Starting scheduled instrument refresh");
                match service.refresh_now().await {
                    Ok(summary) => info!(
                        "Scheduled refresh completed: {} instruments",
                        summary.instruments
                    ),
                    Err(e) => error!("Scheduled refresh failed: {}", e),
                }
            }
        })
    }

    /// Fetch every configured feed and publish a new snapshot, retrying
    /// with capped exponential backoff. On failure the current snapshot
    /// stays in place and the failure streak grows by one.
    pub async fn refresh_now(&self) -> Result<RefreshSummary, FeedError> {
        let _guard = self.refresh_lock.lock().await;
        let start = Instant::now();
        let max_retries = self.config.refresh.max_retries;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch_snapshot().await {
                Ok((snapshot, rejected)) => {
                    let summary = RefreshSummary {
                        instruments: snapshot.len(),
                        rejected,
                        venues: snapshot.venue_counts(),
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    };
                    self.store.load(snapshot);
                    self.persist_current().await;

                    info!(
                        "Refreshed {} instruments in {:?} ({} rows rejected)",
                        summary.instruments, summary.elapsed, summary.rejected
                    );
                    return Ok(summary);
                }
                Err(e) if attempt <= max_retries => {
                    let delay = self.config.refresh.retry_delay(attempt);
                    warn!(
                        "Instrument fetch failed: {}. Retrying in {:?} (attempt {}/{})",
                        e, delay, attempt, max_retries
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    let err = FeedError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    };
                    self.store.record_failure(&err);
                    return Err(err);
                }
            }
        }
    }

    /// All feeds or nothing. Downloads run on the runtime, decoding and
    /// indexing on the blocking pool.
    async fn fetch_snapshot(&self) -> Result<(SecurityMaster, usize), FeedError> {
        let mut downloads = Vec::with_capacity(self.config.feeds.len());
        for spec in &self.config.feeds {
            let bytes = self.fetch_archive(spec).await?;
            downloads.push((spec.clone(), bytes));
        }

        task::spawn_blocking(move || -> Result<(SecurityMaster, usize), FeedError> {
            let mut records = Vec::new();
            let mut rejected = 0;

            for (spec, bytes) in &downloads {
                let report = ingest_archive(spec, bytes)?;
                rejected += report.rejected;
                records.extend(report.records);
            }

            let (snapshot, build_rejected) = SecurityMaster::build(records, Utc::now());
            Ok((snapshot, rejected + build_rejected.len()))
        })
        .await?
    }

    async fn fetch_archive(&self, spec: &FeedSpec) -> Result<Vec<u8>, FeedError> {
        let http_err = |source| FeedError::Http {
            url: spec.url.clone(),
            source,
        };

        info!("Downloading {}", spec.url);
        let response = self.client.get(&spec.url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url: spec.url.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(http_err)?;
        debug!("Downloaded {} bytes from {}", bytes.len(), spec.url);
        Ok(bytes.to_vec())
    }

    async fn persist_current(&self) {
        let Some(path) = self.config.cache_path.clone() else {
            return;
        };
        let snapshot = self.store.current();
        let normalizer = self.normalizer;
        let source = self.source;

        let written = task::spawn_blocking(move || {
            cache::write_snapshot(&path, &snapshot, &normalizer, source)
        })
        .await;
        match written {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Failed to write instrument cache: {:#}", e),
            Err(e) => warn!("Instrument cache writer failed: {}", e),
        }
    }

    fn lookup<T>(&self, value: T) -> Lookup<T> {
        Lookup {
            value,
            stale: self.store.staleness(),
        }
    }

    /// Resolve against the current snapshot
    pub fn resolve(&self, request: &ResolveRequest) -> Lookup<Option<ResolvedInstrument>> {
        let snapshot = self.store.current();
        self.lookup(self.resolver.resolve(&snapshot, request))
    }

    pub fn search(&self, venue: Venue, text: &str) -> Lookup<Vec<InstrumentRecord>> {
        let snapshot = self.store.current();
        let hits = snapshot.search(venue, text).into_iter().cloned().collect();
        self.lookup(hits)
    }

    pub fn classify_token(&self, venue: Venue, token: &str) -> TokenKind {
        self.store.current().classify_token(venue, token)
    }

    /// Canonical symbol of a token, if the token exists
    pub fn normalized_symbol(&self, venue: Venue, token: &str) -> Option<String> {
        let snapshot = self.store.current();
        snapshot
            .by_token(venue, token)
            .map(|record| self.normalizer.normalize(record))
    }
}
