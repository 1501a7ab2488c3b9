//! Vendor security master feeds
//!
//! Each vendor ships a zip archive of comma-delimited text files. An
//! adapter maps the vendor's columns onto [`InstrumentRecord`]; rows that
//! fail to map are counted and skipped.

pub mod archive;
pub mod breeze;
pub mod noren;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::{FeedError, RecordParseError};
use crate::instruments::types::{InstrumentClass, InstrumentRecord};

pub use breeze::BreezeAdapter;
pub use noren::NorenAdapter;

/// Rejected rows logged individually before switching to a summary
const MAX_LOGGED_ROW_ERRORS: usize = 10;

/// Expiry layouts seen across vendor files
const EXPIRY_FORMATS: [&str; 4] = ["%d-%b-%Y", "%Y-%m-%d", "%d%b%Y", "%d/%m/%Y"];
const EXPIRY_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column mapping from one vendor's row layout to the canonical record
pub trait FeedAdapter: Send + Sync {
    /// Raw row as deserialized from the vendor file
    type Row: DeserializeOwned;

    /// Vendor name for logs
    fn name(&self) -> &'static str;

    /// Map one row. `member` is the archive member the row came from.
    fn to_record(&self, member: &str, row: Self::Row) -> Result<InstrumentRecord, RecordParseError>;
}

/// Supported vendor layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// TradeSmart (Noren OMS) per-venue symbol files
    Noren,
    /// ICICI Direct (Breeze) security master
    Breeze,
}

/// One downloadable archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub kind: FeedKind,
    pub url: String,
}

impl FeedSpec {
    pub fn new(kind: FeedKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }
}

/// Outcome of ingesting one member or archive
#[derive(Debug, Default)]
pub struct IngestReport {
    pub records: Vec<InstrumentRecord>,
    pub rejected: usize,
}

impl IngestReport {
    fn merge(&mut self, other: IngestReport) {
        self.records.extend(other.records);
        self.rejected += other.rejected;
    }
}

/// Decode an archive fetched for `spec` into canonical records
pub fn ingest_archive(spec: &FeedSpec, bytes: &[u8]) -> Result<IngestReport, FeedError> {
    let members = archive::text_members(&spec.url, bytes)?;
    let mut report = IngestReport::default();

    for (name, data) in members {
        let member_report = match spec.kind {
            FeedKind::Noren => ingest_member(&NorenAdapter, &name, data.as_slice())?,
            FeedKind::Breeze => ingest_member(&BreezeAdapter, &name, data.as_slice())?,
        };
        info!(
            "Parsed {} instruments from {} ({} rows rejected)",
            member_report.records.len(),
            name,
            member_report.rejected
        );
        report.merge(member_report);
    }

    if report.records.is_empty() {
        return Err(FeedError::NoRecords {
            url: spec.url.clone(),
            rejected: report.rejected,
        });
    }

    Ok(report)
}

/// Parse one delimited text member with `adapter`
pub fn ingest_member<A: FeedAdapter, R: Read>(
    adapter: &A,
    member: &str,
    data: R,
) -> Result<IngestReport, FeedError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader
        .headers()
        .map(clean_record)
        .map_err(|source| FeedError::Csv {
            member: member.to_string(),
            source,
        })?;

    let mut report = IngestReport::default();

    for (line, row) in reader.records().enumerate() {
        let parsed = row
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                clean_record(&raw)
                    .deserialize::<A::Row>(Some(&headers))
                    .map_err(|e| e.to_string())
            })
            .and_then(|row| adapter.to_record(member, row).map_err(|e| e.to_string()));

        match parsed {
            Ok(record) => report.records.push(record),
            Err(e) => {
                report.rejected += 1;
                if report.rejected <= MAX_LOGGED_ROW_ERRORS {
                    warn!("{}: rejected row {} of {}: {}", adapter.name(), line + 2, member, e);
                }
            }
        }
    }

    if report.rejected > 0 {
        warn!(
            "{}: total rejected rows in {}: {}",
            adapter.name(),
            member,
            report.rejected
        );
    }
    debug!("{}: {} rows accepted from {}", adapter.name(), report.records.len(), member);

    Ok(report)
}

/// Strip padding and stray quotes that survive csv unquoting
fn clean_record(record: &StringRecord) -> StringRecord {
    record
        .iter()
        .map(|field| field.trim().trim_matches('"').trim())
        .collect()
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn required(
    value: Option<String>,
    field: &'static str,
) -> Result<String, RecordParseError> {
    non_empty(value).ok_or(RecordParseError::MissingField(field))
}

/// Parse a vendor expiry date
pub fn parse_expiry(value: &str) -> Result<NaiveDate, RecordParseError> {
    let value = value.trim();
    EXPIRY_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, EXPIRY_DATETIME_FORMAT)
                .ok()
                .map(|dt| dt.date())
        })
        .ok_or_else(|| RecordParseError::InvalidDate(value.to_string()))
}

pub(crate) fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, RecordParseError> {
    Decimal::from_str(value.trim()).map_err(|_| RecordParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Lot size, allowing "50" and "50.0". Missing lot size on a cash
/// instrument defaults to one share.
pub(crate) fn parse_lot_size(
    value: Option<String>,
    class: InstrumentClass,
) -> Result<u32, RecordParseError> {
    let Some(value) = non_empty(value) else {
        return match class {
            InstrumentClass::Equity => Ok(1),
            _ => Err(RecordParseError::MissingField("lot_size")),
        };
    };

    let lots = parse_decimal("lot_size", &value)?
        .trunc()
        .to_i64()
        .ok_or_else(|| RecordParseError::InvalidNumber {
            field: "lot_size",
            value: value.clone(),
        })?;

    if lots <= 0 {
        return Err(RecordParseError::NonPositiveLotSize(lots));
    }
    u32::try_from(lots).map_err(|_| RecordParseError::InvalidNumber {
        field: "lot_size",
        value,
    })
}

/// File name without directories, as stored in the archive
pub(crate) fn member_file_name(member: &str) -> &str {
    member.rsplit(['/', '\\']).next().unwrap_or(member)
}
