//! Maps a trading intent to one concrete instrument of a snapshot
//!
//! Resolution is a pure function of (snapshot, request): no I/O, no
//! locking. A miss is `None`, which callers treat as final.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bucket::select_expiry;
use super::store::SecurityMaster;
use super::types::{
    ExpiryBucket, InstrumentClass, InstrumentRecord, OptionRight, UnderlyingMatch, Venue,
};

/// What the caller wants to trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub venue: Venue,
    pub underlying: String,
    pub strike: Option<Decimal>,
    pub right: Option<OptionRight>,
    pub expiry: ExpiryBucket,
    pub instrument_class: InstrumentClass,
}

impl ResolveRequest {
    pub fn option(
        venue: Venue,
        underlying: impl Into<String>,
        strike: Decimal,
        right: OptionRight,
        expiry: ExpiryBucket,
    ) -> Self {
        Self {
            venue,
            underlying: underlying.into(),
            strike: Some(strike),
            right: Some(right),
            expiry,
            instrument_class: InstrumentClass::Option,
        }
    }

    pub fn future(venue: Venue, underlying: impl Into<String>, expiry: ExpiryBucket) -> Self {
        Self {
            venue,
            underlying: underlying.into(),
            strike: None,
            right: None,
            expiry,
            instrument_class: InstrumentClass::Future,
        }
    }

    /// Cash instrument; the expiry bucket is ignored
    pub fn equity(venue: Venue, underlying: impl Into<String>) -> Self {
        Self {
            venue,
            underlying: underlying.into(),
            strike: None,
            right: None,
            expiry: ExpiryBucket::NearestWeekly,
            instrument_class: InstrumentClass::Equity,
        }
    }
}

/// Everything order placement needs from a resolved instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedInstrument {
    pub token: String,
    pub trading_symbol: String,
    pub lot_size: u32,
}

impl From<&InstrumentRecord> for ResolvedInstrument {
    fn from(record: &InstrumentRecord) -> Self {
        Self {
            token: record.token.clone(),
            trading_symbol: record.trading_symbol.clone(),
            lot_size: record.lot_size,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstrumentResolver {
    underlying_match: UnderlyingMatch,
}

impl InstrumentResolver {
    pub fn new(underlying_match: UnderlyingMatch) -> Self {
        Self { underlying_match }
    }

    pub fn resolve(
        &self,
        snapshot: &SecurityMaster,
        request: &ResolveRequest,
    ) -> Option<ResolvedInstrument> {
        self.resolve_record(snapshot, request).map(ResolvedInstrument::from)
    }

    /// Same as [`resolve`](Self::resolve) but hands back the full record
    pub fn resolve_record<'s>(
        &self,
        snapshot: &'s SecurityMaster,
        request: &ResolveRequest,
    ) -> Option<&'s InstrumentRecord> {
        let candidates = self.candidates(snapshot, request);

        let picked = match request.instrument_class {
            InstrumentClass::Equity => candidates.into_iter().min_by(|a, b| {
                a.trading_symbol
                    .cmp(&b.trading_symbol)
                    .then_with(|| a.token.cmp(&b.token))
            }),
            InstrumentClass::Future | InstrumentClass::Option => {
                select_expiry(candidates, request.expiry)
            }
        };

        if picked.is_none() {
            debug!(
                "No {} instrument for {} {:?} {:?} {:?} on {}",
                request.instrument_class,
                request.underlying,
                request.strike,
                request.right,
                request.expiry,
                request.venue
            );
        }
        picked
    }

    /// Records of the request's venue passing the class-specific filter,
    /// before expiry bucketing
    pub fn candidates<'s>(
        &self,
        snapshot: &'s SecurityMaster,
        request: &ResolveRequest,
    ) -> Vec<&'s InstrumentRecord> {
        let underlying = request.underlying.trim();

        if request.instrument_class == InstrumentClass::Option
            && (request.strike.is_none() || request.right.is_none())
        {
            debug!("Option request for {} lacks strike or right", underlying);
            return Vec::new();
        }

        snapshot
            .venue(request.venue)
            .filter(|r| r.instrument_class == request.instrument_class)
            .filter(|r| self.underlying_match.matches(r, underlying))
            .filter(|r| match request.instrument_class {
                InstrumentClass::Option => {
                    r.option_right == request.right && r.strike_price == request.strike
                }
                InstrumentClass::Future | InstrumentClass::Equity => true,
            })
            .collect()
    }
}
