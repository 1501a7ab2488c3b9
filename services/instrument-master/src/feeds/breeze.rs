//! ICICI Direct (Breeze) security master
//!
//! A single `SecurityMaster.zip` with one text file per segment
//! (`NSEScripMaster.txt`, `FONSEScripMaster.txt`, ...). Headers come quoted
//! and padded; ICICI uses its own short names for some index underlyings.

use serde::Deserialize;

use super::{
    FeedAdapter, member_file_name, non_empty, parse_decimal, parse_expiry, parse_lot_size, required,
};
use crate::error::RecordParseError;
use crate::instruments::types::{InstrumentClass, InstrumentRecord, OptionRight, Venue};

pub const BREEZE_SECURITY_MASTER_URL: &str =
    "https://directlink.icicidirect.com/NewSecurityMaster/SecurityMaster.zip";

/// ICICI short name to canonical underlying
const SHORT_NAME_ALIASES: [(&str, &str); 2] = [("CNXBAN", "BANKNIFTY"), ("NIFFIN", "FINNIFTY")];

/// Member file prefixes, most specific first
const MEMBER_VENUES: [(&str, Venue); 5] = [
    ("FONSE", Venue::NFO),
    ("FOBSE", Venue::BFO),
    ("CDNSE", Venue::CDS),
    ("BSE", Venue::BSE),
    ("NSE", Venue::NSE),
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BreezeScripRow {
    #[serde(rename = "Token")]
    pub token: Option<String>,
    #[serde(rename = "ShortName")]
    pub short_name: Option<String>,
    #[serde(rename = "Series")]
    pub series: Option<String>,
    #[serde(rename = "ExchangeCode")]
    pub exchange_code: Option<String>,
    #[serde(rename = "ExpiryDate")]
    pub expiry_date: Option<String>,
    #[serde(rename = "StrikePrice")]
    pub strike_price: Option<String>,
    #[serde(rename = "OptionType")]
    pub option_type: Option<String>,
    #[serde(rename = "ExAllowed")]
    pub ex_allowed: Option<String>,
    #[serde(rename = "LotSize")]
    pub lot_size: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
}

/// Canonical underlying for an ICICI short name
pub fn canonical_underlying(short_name: &str) -> String {
    let upper = short_name.trim().to_ascii_uppercase();
    SHORT_NAME_ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(upper)
}

fn classify_series(series: &str) -> InstrumentClass {
    match series.trim().to_ascii_uppercase().as_str() {
        "FUTURE" | "FUT" => InstrumentClass::Future,
        "OPTION" | "OPT" => InstrumentClass::Option,
        _ => InstrumentClass::Equity,
    }
}

fn venue_from_member(member: &str) -> Option<Venue> {
    let name = member_file_name(member).to_ascii_uppercase();
    MEMBER_VENUES
        .iter()
        .find(|(prefix, _)| name.starts_with(*prefix))
        .map(|(_, venue)| *venue)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BreezeAdapter;

impl FeedAdapter for BreezeAdapter {
    type Row = BreezeScripRow;

    fn name(&self) -> &'static str {
        "breeze"
    }

    fn to_record(
        &self,
        member: &str,
        row: BreezeScripRow,
    ) -> Result<InstrumentRecord, RecordParseError> {
        let venue = match non_empty(row.ex_allowed).and_then(|v| v.parse::<Venue>().ok()) {
            Some(venue) => venue,
            None => venue_from_member(member)
                .ok_or_else(|| RecordParseError::UnknownVenue(member.to_string()))?,
        };

        let token = required(row.token, "Token")?;
        let short_name = required(row.short_name, "ShortName")?;
        let instrument_class = non_empty(row.series)
            .map(|s| classify_series(&s))
            .unwrap_or(InstrumentClass::Equity);
        let lot_size = parse_lot_size(row.lot_size, instrument_class)?;

        let (expiry_date, strike_price, option_right) = match instrument_class {
            InstrumentClass::Equity => (None, None, None),
            InstrumentClass::Future => {
                let expiry = parse_expiry(&required(row.expiry_date, "ExpiryDate")?)?;
                (Some(expiry), None, None)
            }
            InstrumentClass::Option => {
                let expiry = parse_expiry(&required(row.expiry_date, "ExpiryDate")?)?;
                let strike = required(row.strike_price, "StrikePrice")?;
                let strike = parse_decimal("StrikePrice", &strike)?;
                let right = required(row.option_type, "OptionType")?.parse::<OptionRight>()?;
                (Some(expiry), Some(strike), Some(right))
            }
        };

        Ok(InstrumentRecord {
            token,
            underlying_symbol: canonical_underlying(&short_name),
            venue,
            instrument_class,
            expiry_date,
            strike_price,
            option_right,
            lot_size,
            trading_symbol: short_name,
        })
    }
}
