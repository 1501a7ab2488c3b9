//! Canonical instrument schema shared by every vendor feed

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RecordParseError;

/// Exchange segment under which tokens are unique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Venue {
    /// NSE cash market
    NSE,
    /// BSE cash market
    BSE,
    /// NSE equity derivatives
    NFO,
    /// BSE equity derivatives
    BFO,
    /// NSE currency derivatives
    CDS,
    /// BSE currency derivatives
    BCD,
    /// MCX commodity derivatives
    MCX,
}

impl Venue {
    /// All venues, in feed download order
    pub const ALL: [Venue; 7] = [
        Venue::NFO,
        Venue::BCD,
        Venue::CDS,
        Venue::NSE,
        Venue::BSE,
        Venue::MCX,
        Venue::BFO,
    ];

    /// Exchange code as used by the vendors
    pub fn as_str(self) -> &'static str {
        match self {
            Venue::NSE => "NSE",
            Venue::BSE => "BSE",
            Venue::NFO => "NFO",
            Venue::BFO => "BFO",
            Venue::CDS => "CDS",
            Venue::BCD => "BCD",
            Venue::MCX => "MCX",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NSE" => Ok(Venue::NSE),
            "BSE" => Ok(Venue::BSE),
            "NFO" => Ok(Venue::NFO),
            "BFO" => Ok(Venue::BFO),
            "CDS" => Ok(Venue::CDS),
            "BCD" => Ok(Venue::BCD),
            "MCX" => Ok(Venue::MCX),
            _ => Err(RecordParseError::UnknownVenue(s.to_string())),
        }
    }
}

/// Instrument classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstrumentClass {
    /// Cash market instrument
    Equity,
    /// Futures contract
    Future,
    /// Options contract
    Option,
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstrumentClass::Equity => "EQUITY",
            InstrumentClass::Future => "FUTURE",
            InstrumentClass::Option => "OPTION",
        })
    }
}

impl FromStr for InstrumentClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EQUITY" | "EQ" | "CASH" => Ok(InstrumentClass::Equity),
            "FUTURE" | "FUT" | "FUTIDX" | "FUTSTK" => Ok(InstrumentClass::Future),
            "OPTION" | "OPT" | "OPTIDX" | "OPTSTK" => Ok(InstrumentClass::Option),
            other => Err(format!("unknown instrument class: {other}")),
        }
    }
}

/// Option type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    /// Call option
    Call,
    /// Put option
    Put,
}

impl OptionRight {
    /// Exchange suffix, "CE" or "PE"
    pub fn suffix(self) -> &'static str {
        match self {
            OptionRight::Call => "CE",
            OptionRight::Put => "PE",
        }
    }
}

impl FromStr for OptionRight {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CE" | "CALL" | "C" => Ok(OptionRight::Call),
            "PE" | "PUT" | "P" => Ok(OptionRight::Put),
            _ => Err(RecordParseError::UnknownOptionRight(s.to_string())),
        }
    }
}

/// Relative position on the expiry timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpiryBucket {
    NearestWeekly,
    NextWeekly,
    NearestMonthly,
    NextMonthly,
    ThirdMonthly,
}

impl ExpiryBucket {
    /// Selects from the monthly subsequence rather than the full sequence
    pub fn is_monthly(self) -> bool {
        matches!(
            self,
            ExpiryBucket::NearestMonthly | ExpiryBucket::NextMonthly | ExpiryBucket::ThirdMonthly
        )
    }

    /// Zero-based position within the selected sequence
    pub fn position(self) -> usize {
        match self {
            ExpiryBucket::NearestWeekly | ExpiryBucket::NearestMonthly => 0,
            ExpiryBucket::NextWeekly | ExpiryBucket::NextMonthly => 1,
            ExpiryBucket::ThirdMonthly => 2,
        }
    }
}

impl FromStr for ExpiryBucket {
    type Err = String;

    /// Accepts the short codes used by the front end (W, NW, M, NM, NNM)
    /// as well as the long names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "W" | "NEAREST_WEEKLY" => Ok(ExpiryBucket::NearestWeekly),
            "NW" | "NEXT_WEEKLY" => Ok(ExpiryBucket::NextWeekly),
            "M" | "NEAREST_MONTHLY" => Ok(ExpiryBucket::NearestMonthly),
            "NM" | "NEXT_MONTHLY" => Ok(ExpiryBucket::NextMonthly),
            "NNM" | "THIRD_MONTHLY" => Ok(ExpiryBucket::ThirdMonthly),
            other => Err(format!("unknown expiry bucket: {other}")),
        }
    }
}

/// Coarse classification of a token, as the order glue needs it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Call,
    Put,
    Cash,
    Other,
}

/// One tradable instrument in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    /// Identifier unique within `venue`
    pub token: String,
    /// Underlying (e.g. "BANKNIFTY", "RELIANCE")
    pub underlying_symbol: String,
    pub venue: Venue,
    pub instrument_class: InstrumentClass,
    /// Absent for equities
    pub expiry_date: Option<NaiveDate>,
    /// Present only for options
    pub strike_price: Option<Decimal>,
    /// Present only for options
    pub option_right: Option<OptionRight>,
    pub lot_size: u32,
    /// Vendor's display symbol
    pub trading_symbol: String,
}

impl InstrumentRecord {
    /// Check the per-class field invariants
    pub fn validate(&self) -> Result<(), RecordParseError> {
        let missing = |field| RecordParseError::MissingClassField {
            token: self.token.clone(),
            class: self.instrument_class,
            field,
        };
        let unexpected = |field| RecordParseError::UnexpectedClassField {
            token: self.token.clone(),
            class: self.instrument_class,
            field,
        };

        if self.token.is_empty() {
            return Err(RecordParseError::MissingField("token"));
        }
        if self.lot_size == 0 {
            return Err(RecordParseError::NonPositiveLotSize(0));
        }

        if self.instrument_class != InstrumentClass::Option && self.strike_price.is_some() {
            return Err(unexpected("strike_price"));
        }

        match self.instrument_class {
            InstrumentClass::Equity => {
                if self.expiry_date.is_some() {
                    return Err(unexpected("expiry_date"));
                }
                if self.option_right.is_some() {
                    return Err(unexpected("option_right"));
                }
            }
            InstrumentClass::Future => {
                if self.expiry_date.is_none() {
                    return Err(missing("expiry_date"));
                }
                if self.option_right.is_some() {
                    return Err(unexpected("option_right"));
                }
            }
            InstrumentClass::Option => {
                if self.expiry_date.is_none() {
                    return Err(missing("expiry_date"));
                }
                if self.strike_price.is_none() {
                    return Err(missing("strike_price"));
                }
                if self.option_right.is_none() {
                    return Err(missing("option_right"));
                }
            }
        }

        Ok(())
    }

    /// Coarse token classification
    pub fn kind(&self) -> TokenKind {
        match (self.instrument_class, self.option_right) {
            (InstrumentClass::Option, Some(OptionRight::Call)) => TokenKind::Call,
            (InstrumentClass::Option, Some(OptionRight::Put)) => TokenKind::Put,
            (InstrumentClass::Equity, _) => TokenKind::Cash,
            _ => TokenKind::Other,
        }
    }
}

/// Which field the resolver compares the requested underlying against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderlyingMatch {
    /// Case-insensitive equality on `underlying_symbol`
    #[default]
    Exact,
    /// Case-insensitive substring of the vendor trading symbol
    TradingSymbolContains,
}

impl UnderlyingMatch {
    pub fn matches(self, record: &InstrumentRecord, underlying: &str) -> bool {
        match self {
            UnderlyingMatch::Exact => record.underlying_symbol.eq_ignore_ascii_case(underlying),
            UnderlyingMatch::TradingSymbolContains => record
                .trading_symbol
                .to_ascii_uppercase()
                .contains(&underlying.to_ascii_uppercase()),
        }
    }
}
