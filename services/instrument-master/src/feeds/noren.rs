//! TradeSmart (Noren OMS) symbol files
//!
//! One archive per venue, `<VENUE>_symbols.txt.zip`, holding
//! `<VENUE>_symbols.txt` with columns
//! `Exchange,Token,LotSize,Symbol,TradingSymbol,Expiry,Instrument,OptionType,StrikePrice,TickSize`.
//! Cash venues omit the derivative columns.

use serde::Deserialize;

use super::{
    FeedAdapter, member_file_name, non_empty, parse_decimal, parse_expiry, parse_lot_size, required,
};
use crate::error::RecordParseError;
use crate::instruments::types::{InstrumentClass, InstrumentRecord, OptionRight, Venue};

/// Base URL of the TradeSmart symbol archives
pub const NOREN_SYMBOLS_BASE_URL: &str = "https://v2api.tradesmartonline.in";

/// Archive URL for one venue
pub fn symbols_url(base: &str, venue: Venue) -> String {
    format!("{}/{}_symbols.txt.zip", base.trim_end_matches('/'), venue)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NorenSymbolRow {
    #[serde(rename = "Exchange")]
    pub exchange: Option<String>,
    #[serde(rename = "Token")]
    pub token: Option<String>,
    #[serde(rename = "LotSize")]
    pub lot_size: Option<String>,
    #[serde(rename = "Symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "TradingSymbol")]
    pub trading_symbol: Option<String>,
    #[serde(rename = "Expiry")]
    pub expiry: Option<String>,
    #[serde(rename = "Instrument")]
    pub instrument: Option<String>,
    #[serde(rename = "OptionType")]
    pub option_type: Option<String>,
    #[serde(rename = "StrikePrice")]
    pub strike_price: Option<String>,
    #[serde(rename = "Strike")]
    pub strike: Option<String>,
}

/// Noren instrument codes: OPTIDX/OPTSTK/OPTCUR/OPTFUT are options,
/// FUTIDX/FUTSTK/FUTCUR/FUTCOM futures, everything else cash
pub fn classify_instrument(code: &str) -> InstrumentClass {
    let code = code.to_ascii_uppercase();
    if code.contains("OPT") {
        InstrumentClass::Option
    } else if code.contains("FUT") {
        InstrumentClass::Future
    } else {
        InstrumentClass::Equity
    }
}

/// Venue from the member name prefix, e.g. `NFO_symbols.txt`
fn venue_from_member(member: &str) -> Option<Venue> {
    member_file_name(member)
        .split('_')
        .next()
        .and_then(|prefix| prefix.parse().ok())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NorenAdapter;

impl FeedAdapter for NorenAdapter {
    type Row = NorenSymbolRow;

    fn name(&self) -> &'static str {
        "noren"
    }

    fn to_record(
        &self,
        member: &str,
        row: NorenSymbolRow,
    ) -> Result<InstrumentRecord, RecordParseError> {
        let venue = match venue_from_member(member) {
            Some(venue) => venue,
            None => required(row.exchange, "Exchange")?.parse::<Venue>()?,
        };

        let token = required(row.token, "Token")?;
        let underlying_symbol = required(row.symbol, "Symbol")?;
        let trading_symbol = required(row.trading_symbol, "TradingSymbol")?;
        let instrument_class = non_empty(row.instrument)
            .map(|code| classify_instrument(&code))
            .unwrap_or(InstrumentClass::Equity);
        let lot_size = parse_lot_size(row.lot_size, instrument_class)?;

        let (expiry_date, strike_price, option_right) = match instrument_class {
            InstrumentClass::Equity => (None, None, None),
            InstrumentClass::Future => {
                let expiry = parse_expiry(&required(row.expiry, "Expiry")?)?;
                (Some(expiry), None, None)
            }
            InstrumentClass::Option => {
                let expiry = parse_expiry(&required(row.expiry, "Expiry")?)?;
                let strike = non_empty(row.strike_price)
                    .or_else(|| non_empty(row.strike))
                    .ok_or(RecordParseError::MissingField("StrikePrice"))?;
                let right = required(row.option_type, "OptionType")?.parse::<OptionRight>()?;
                (
                    Some(expiry),
                    Some(parse_decimal("StrikePrice", &strike)?),
                    Some(right),
                )
            }
        };

        Ok(InstrumentRecord {
            token,
            underlying_symbol,
            venue,
            instrument_class,
            expiry_date,
            strike_price,
            option_right,
            lot_size,
            trading_symbol,
        })
    }
}
