//! Error types for feed ingestion and symbol normalization
//!
//! Resolution misses are not errors: the resolver returns `Option` and
//! callers branch on `None`.

use crate::instruments::types::{InstrumentClass, Venue};
use thiserror::Error;

/// Failure while fetching or decoding a vendor feed.
///
/// Never reaches resolve callers: the refresh task retries and the store
/// keeps serving the last good snapshot.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport level failure
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Archive could not be opened or a member could not be read
    #[error("Archive error in {url}: {source}")]
    Archive {
        url: String,
        #[source]
        source: zip::result::ZipError,
    },

    /// Archive contained no plaintext member
    #[error("Archive from {url} contains no .txt member")]
    EmptyArchive { url: String },

    /// Reading a member failed
    #[error("I/O error reading {member}: {source}")]
    Io {
        member: String,
        #[source]
        source: std::io::Error,
    },

    /// Header row of a member could not be read
    #[error("CSV error in {member}: {source}")]
    Csv {
        member: String,
        #[source]
        source: csv::Error,
    },

    /// Every row of the feed was rejected
    #[error("Feed {url} produced no valid records ({rejected} rows rejected)")]
    NoRecords { url: String, rejected: usize },

    /// Decoding task panicked or was cancelled
    #[error("Feed decoding task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// Retry budget spent
    #[error("Feed refresh failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<FeedError>,
    },
}

/// A single malformed row. Excluded from the snapshot; ingestion continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordParseError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid number in '{field}': {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unparseable expiry date {0:?}")]
    InvalidDate(String),

    #[error("unknown venue {0:?}")]
    UnknownVenue(String),

    #[error("unknown option type {0:?}")]
    UnknownOptionRight(String),

    #[error("lot size must be positive, got {0}")]
    NonPositiveLotSize(i64),

    #[error("{class:?} record {token} is missing {field}")]
    MissingClassField {
        token: String,
        class: InstrumentClass,
        field: &'static str,
    },

    #[error("{class:?} record {token} must not carry {field}")]
    UnexpectedClassField {
        token: String,
        class: InstrumentClass,
        field: &'static str,
    },

    #[error("duplicate token {token} on {venue}")]
    DuplicateToken { venue: Venue, token: String },
}

/// Why a canonical symbol could not be derived for a record.
///
/// The normalizer recovers from this by returning the vendor symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("record has no expiry date")]
    MissingExpiry,

    #[error("option record has no strike price")]
    MissingStrike,

    #[error("option record has no option right")]
    MissingRight,

    #[error("strike price does not fit an integer")]
    StrikeOutOfRange,
}
