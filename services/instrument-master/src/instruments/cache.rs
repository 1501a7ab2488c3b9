//! Combined CSV snapshot on disk
//!
//! Written after every successful refresh so a restart can serve the last
//! good table before the network is reachable. The file carries the
//! canonical columns plus the normalized symbol of each record, tagged
//! with the vendor layout it came from so one broker never starts from
//! another broker's table.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use super::normalizer::SymbolNormalizer;
use super::store::SecurityMaster;
use super::types::{InstrumentClass, InstrumentRecord, OptionRight, Venue};
use crate::feeds::FeedKind;

#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    source: FeedKind,
    venue: Venue,
    token: String,
    underlying_symbol: String,
    instrument_class: InstrumentClass,
    expiry_date: Option<NaiveDate>,
    strike_price: Option<Decimal>,
    option_right: Option<OptionRight>,
    lot_size: u32,
    trading_symbol: String,
    normalized_symbol: String,
    retrieved_at: DateTime<Utc>,
}

impl CacheRow {
    fn new(
        source: FeedKind,
        record: &InstrumentRecord,
        normalized_symbol: String,
        retrieved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            venue: record.venue,
            token: record.token.clone(),
            underlying_symbol: record.underlying_symbol.clone(),
            instrument_class: record.instrument_class,
            expiry_date: record.expiry_date,
            strike_price: record.strike_price,
            option_right: record.option_right,
            lot_size: record.lot_size,
            trading_symbol: record.trading_symbol.clone(),
            normalized_symbol,
            retrieved_at,
        }
    }

    fn into_record(self) -> InstrumentRecord {
        InstrumentRecord {
            token: self.token,
            underlying_symbol: self.underlying_symbol,
            venue: self.venue,
            instrument_class: self.instrument_class,
            expiry_date: self.expiry_date,
            strike_price: self.strike_price,
            option_right: self.option_right,
            lot_size: self.lot_size,
            trading_symbol: self.trading_symbol,
        }
    }
}

/// Write `snapshot` to `path`, replacing any previous file in one rename
pub fn write_snapshot(
    path: &Path,
    snapshot: &SecurityMaster,
    normalizer: &SymbolNormalizer,
    source: FeedKind,
) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory {}", parent.display()))?;
    }

    let retrieved_at = snapshot.retrieved_at().unwrap_or_else(Utc::now);
    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp_path)
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        for record in snapshot.records() {
            writer
                .serialize(CacheRow::new(
                    source,
                    record,
                    normalizer.normalize(record),
                    retrieved_at,
                ))
                .context("Failed to write cache row")?;
        }
        writer.flush().context("Failed to flush cache file")?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move cache into place at {}", path.display()))?;

    info!("Wrote {} instruments to {}", snapshot.len(), path.display());
    Ok(snapshot.len())
}

/// Load a snapshot written by [`write_snapshot`] for `source`. `Ok(None)`
/// when the file does not exist or was written from another vendor.
pub fn read_snapshot(path: &Path, source: FeedKind) -> Result<Option<SecurityMaster>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open cache {}", path.display()))?;
    let mut records = Vec::new();
    let mut retrieved_at = None;
    let mut bad_rows = 0_usize;

    for row in reader.deserialize::<CacheRow>() {
        match row {
            Ok(row) if row.source != source => {
                warn!(
                    "Ignoring cache {}: written from {:?} feeds, expected {:?}",
                    path.display(),
                    row.source,
                    source
                );
                return Ok(None);
            }
            Ok(row) => {
                retrieved_at.get_or_insert(row.retrieved_at);
                records.push(row.into_record());
            }
            Err(_) => bad_rows += 1,
        }
    }

    if bad_rows > 0 {
        warn!("Skipped {} unreadable rows in {}", bad_rows, path.display());
    }

    let (snapshot, _) = SecurityMaster::build(records, retrieved_at.unwrap_or_else(Utc::now));
    info!("Loaded {} instruments from cache {}", snapshot.len(), path.display());
    Ok(Some(snapshot))
}
