//! Immutable security master snapshots and the store that publishes them
//!
//! Readers take an `Arc` of the current snapshot and never observe a
//! partially built table. A refresh builds a complete `SecurityMaster` off
//! to the side and swaps it in with a single pointer store.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{InstrumentRecord, TokenKind, Venue};
use crate::error::RecordParseError;

/// Refresh failures tolerated before readers are told the data is stale
pub const DEFAULT_STALE_AFTER_FAILURES: u32 = 3;

/// One complete, immutable instrument table across all venues
#[derive(Debug, Default)]
pub struct SecurityMaster {
    records: Vec<InstrumentRecord>,
    by_venue: FxHashMap<Venue, Vec<usize>>,
    by_token: FxHashMap<(Venue, String), usize>,
    retrieved_at: Option<DateTime<Utc>>,
}

impl SecurityMaster {
    /// Snapshot with no instruments, used before the first load
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from ingested records.
    ///
    /// Records violating the class invariants, and any repeat of a
    /// (venue, token) pair, are excluded and returned as rejects.
    pub fn build(
        records: Vec<InstrumentRecord>,
        retrieved_at: DateTime<Utc>,
    ) -> (Self, Vec<RecordParseError>) {
        let mut snapshot = Self {
            records: Vec::with_capacity(records.len()),
            by_venue: FxHashMap::default(),
            by_token: FxHashMap::default(),
            retrieved_at: Some(retrieved_at),
        };
        let mut rejected = Vec::new();

        for record in records {
            if let Err(e) = record.validate() {
                rejected.push(e);
                continue;
            }

            let key = (record.venue, record.token.clone());
            if snapshot.by_token.contains_key(&key) {
                rejected.push(RecordParseError::DuplicateToken {
                    venue: record.venue,
                    token: record.token,
                });
                continue;
            }

            let idx = snapshot.records.len();
            snapshot.by_token.insert(key, idx);
            snapshot.by_venue.entry(record.venue).or_default().push(idx);
            snapshot.records.push(record);
        }

        if !rejected.is_empty() {
            warn!(
                "Excluded {} records while building security master",
                rejected.len()
            );
        }
        debug!(
            "Built security master with {} records across {} venues",
            snapshot.records.len(),
            snapshot.by_venue.len()
        );

        (snapshot, rejected)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// When the feed behind this snapshot was retrieved
    pub fn retrieved_at(&self) -> Option<DateTime<Utc>> {
        self.retrieved_at
    }

    /// Time since the feeds were retrieved. Clock skew reads as zero.
    pub fn age(&self) -> Option<Duration> {
        self.retrieved_at
            .map(|at| (Utc::now() - at).to_std().unwrap_or_default())
    }

    /// All records in ingestion order
    pub fn records(&self) -> &[InstrumentRecord] {
        &self.records
    }

    /// Records of one venue in ingestion order
    pub fn venue(&self, venue: Venue) -> impl Iterator<Item = &InstrumentRecord> + '_ {
        self.by_venue
            .get(&venue)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&idx| &self.records[idx])
    }

    /// Record counts per venue
    pub fn venue_counts(&self) -> Vec<(Venue, usize)> {
        let mut counts: Vec<_> = self
            .by_venue
            .iter()
            .map(|(venue, idx)| (*venue, idx.len()))
            .collect();
        counts.sort();
        counts
    }

    pub fn by_token(&self, venue: Venue, token: &str) -> Option<&InstrumentRecord> {
        self.by_token
            .get(&(venue, token.to_string()))
            .map(|&idx| &self.records[idx])
    }

    /// Classify a token; unknown tokens are `Other`
    pub fn classify_token(&self, venue: Venue, token: &str) -> TokenKind {
        match self.by_token(venue, token) {
            Some(record) => record.kind(),
            None => {
                debug!("No record for token {} on {}", token, venue);
                TokenKind::Other
            }
        }
    }

    /// Case-insensitive substring search over trading symbol and underlying,
    /// ordered by (instrument class, trading symbol).
    pub fn search(&self, venue: Venue, text: &str) -> Vec<&InstrumentRecord> {
        let needle = text.to_ascii_uppercase();
        let mut hits: Vec<_> = self
            .venue(venue)
            .filter(|r| {
                r.trading_symbol.to_ascii_uppercase().contains(&needle)
                    || r.underlying_symbol.to_ascii_uppercase().contains(&needle)
            })
            .collect();
        hits.sort_by(|a, b| {
            a.instrument_class
                .cmp(&b.instrument_class)
                .then_with(|| a.trading_symbol.cmp(&b.trading_symbol))
        });
        hits
    }
}

/// Why a snapshot is flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// Refreshes keep failing
    RefreshFailures,
    /// Retrieved longer ago than the configured maximum age
    SnapshotTooOld,
}

/// Advisory attached to results served from a snapshot whose refreshes
/// keep failing or that has aged out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleData {
    pub reason: StaleReason,
    pub consecutive_failures: u32,
    pub last_error: String,
    pub snapshot_retrieved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct RefreshHealth {
    consecutive_failures: u32,
    last_error: Option<String>,
}

/// Owner of the current snapshot. Single writer, many readers.
pub struct SecurityMasterStore {
    current: ArcSwap<SecurityMaster>,
    health: Mutex<RefreshHealth>,
    stale_after_failures: u32,
    max_age: Option<Duration>,
}

impl Default for SecurityMasterStore {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER_FAILURES)
    }
}

impl SecurityMasterStore {
    /// Empty store. `stale_after_failures` of zero is treated as one.
    pub fn new(stale_after_failures: u32) -> Self {
        Self {
            current: ArcSwap::from_pointee(SecurityMaster::empty()),
            health: Mutex::new(RefreshHealth::default()),
            stale_after_failures: stale_after_failures.max(1),
            max_age: None,
        }
    }

    /// Also flag snapshots retrieved longer than `max_age` ago
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Publish a new snapshot, returning the one it replaced.
    /// Clears the refresh failure streak.
    pub fn load(&self, snapshot: SecurityMaster) -> Arc<SecurityMaster> {
        let count = snapshot.len();
        let previous = self.current.swap(Arc::new(snapshot));
        *self.health.lock() = RefreshHealth::default();
        info!(
            "Published security master: {} instruments (previous {})",
            count,
            previous.len()
        );
        previous
    }

    /// The active snapshot
    pub fn current(&self) -> Arc<SecurityMaster> {
        self.current.load_full()
    }

    /// Note a failed refresh; the current snapshot stays in place.
    /// Returns the failure streak length.
    pub fn record_failure(&self, error: &dyn std::fmt::Display) -> u32 {
        let mut health = self.health.lock();
        health.consecutive_failures += 1;
        health.last_error = Some(error.to_string());
        warn!(
            "Security master refresh failed ({} in a row), serving last good snapshot: {}",
            health.consecutive_failures, error
        );
        health.consecutive_failures
    }

    /// `Some` once the failure streak reaches the configured threshold or
    /// the snapshot is older than the maximum age
    pub fn staleness(&self) -> Option<StaleData> {
        let health = self.health.lock();
        let snapshot = self.current.load();

        let reason = if health.consecutive_failures >= self.stale_after_failures {
            StaleReason::RefreshFailures
        } else if self
            .max_age
            .zip(snapshot.age())
            .is_some_and(|(max_age, age)| age > max_age)
        {
            StaleReason::SnapshotTooOld
        } else {
            return None;
        };

        Some(StaleData {
            reason,
            consecutive_failures: health.consecutive_failures,
            last_error: health.last_error.clone().unwrap_or_default(),
            snapshot_retrieved_at: snapshot.retrieved_at(),
        })
    }
}
