//! Shared fixtures for instrument master tests

#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::io::{Cursor, Write};
use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use instrument_master::instruments::{
    InstrumentClass, InstrumentRecord, OptionRight, SecurityMaster, Venue,
};

static INIT: Once = Once::new();

/// Route crate logs through the test harness
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "instrument_master=debug,warn".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .init();
    });
}

pub const WEEKLY_EXPIRY: (i32, u32, u32) = (2025, 4, 24);
pub const MONTHLY_EXPIRY: (i32, u32, u32) = (2025, 4, 30);

/// Noren NFO member with a trailing delimiter, as the vendor ships it
pub const NOREN_NFO_CSV: &str = "\
Exchange,Token,LotSize,Symbol,TradingSymbol,Expiry,Instrument,OptionType,StrikePrice,TickSize,
NFO,35002,30,BANKNIFTY,BANKNIFTY24APR25C46000,24-APR-2025,OPTIDX,CE,46000,0.05,
NFO,35012,30,BANKNIFTY,BANKNIFTY30APR25C46000,30-APR-2025,OPTIDX,CE,46000.00,0.05,
NFO,35112,30,BANKNIFTY,BANKNIFTY30APR25P46000,30-APR-2025,OPTIDX,PE,46000,0.05,
NFO,35200,30,BANKNIFTY,BANKNIFTY30APR25F,30-APR-2025,FUTIDX,XX,0,0.05,
NFO,99999,30,BANKNIFTY,BROKEN,not-a-date,OPTIDX,CE,46000,0.05,
NFO,99998,,BANKNIFTY,NOLOT,24-APR-2025,OPTIDX,CE,46000,0.05,
";

/// Noren NSE member, no derivative columns
pub const NOREN_NSE_CSV: &str = "\
Exchange,Token,LotSize,Symbol,TradingSymbol,Instrument,TickSize
NSE,2885,1,RELIANCE,RELIANCE-EQ,EQ,0.05
NSE,26009,1,Nifty Bank,Nifty Bank,INDEX,0.05
";

/// ICICI segment file with quoted, padded headers
pub const BREEZE_FONSE_CSV: &str = "\
 \"Token\", \"ShortName\", \"Series\", \"ExpiryDate\", \"StrikePrice\", \"OptionType\", \"ExAllowed\", \"LotSize\", \"Name\"
47251,CNXBAN,OPTION,24-Apr-2025,46000,CE,NFO,30,NIFTY BANK
47252,CNXBAN,OPTION,30-Apr-2025,46000,CE,NFO,30,NIFTY BANK
47300,NIFFIN,FUTURE,29-Apr-2025,0,XX,NFO,65,NIFTY FIN SERVICE
47400,NIFTY,OPTION,24-Apr-2025,,CE,NFO,75,NIFTY 50
";

pub fn date(ymd: (i32, u32, u32)) -> NaiveDate {
    NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2).expect("valid date")
}

pub fn option(
    token: &str,
    underlying: &str,
    strike: i64,
    right: OptionRight,
    expiry: NaiveDate,
) -> InstrumentRecord {
    InstrumentRecord {
        token: token.to_string(),
        underlying_symbol: underlying.to_string(),
        venue: Venue::NFO,
        instrument_class: InstrumentClass::Option,
        expiry_date: Some(expiry),
        strike_price: Some(Decimal::from(strike)),
        option_right: Some(right),
        lot_size: 30,
        trading_symbol: format!(
            "{}{}{}{}",
            underlying,
            expiry.format("%d%b%y").to_string().to_uppercase(),
            if right == OptionRight::Call { "C" } else { "P" },
            strike
        ),
    }
}

pub fn future(token: &str, underlying: &str, expiry: NaiveDate) -> InstrumentRecord {
    InstrumentRecord {
        token: token.to_string(),
        underlying_symbol: underlying.to_string(),
        venue: Venue::NFO,
        instrument_class: InstrumentClass::Future,
        expiry_date: Some(expiry),
        strike_price: None,
        option_right: None,
        lot_size: 30,
        trading_symbol: format!(
            "{}{}F",
            underlying,
            expiry.format("%d%b%y").to_string().to_uppercase()
        ),
    }
}

pub fn equity(token: &str, underlying: &str, trading_symbol: &str) -> InstrumentRecord {
    InstrumentRecord {
        token: token.to_string(),
        underlying_symbol: underlying.to_string(),
        venue: Venue::NSE,
        instrument_class: InstrumentClass::Equity,
        expiry_date: None,
        strike_price: None,
        option_right: None,
        lot_size: 1,
        trading_symbol: trading_symbol.to_string(),
    }
}

/// BANKNIFTY calls at 45900/46000/46100 for the 24 and 30 April expiries,
/// one put, three monthly futures, NIFTY futures and two NSE equities
pub fn scenario_records() -> Vec<InstrumentRecord> {
    let weekly = date(WEEKLY_EXPIRY);
    let monthly = date(MONTHLY_EXPIRY);

    vec![
        // Monthly listed first so ordering comes from the bucketer
        option("35011", "BANKNIFTY", 45900, OptionRight::Call, monthly),
        option("35012", "BANKNIFTY", 46000, OptionRight::Call, monthly),
        option("35013", "BANKNIFTY", 46100, OptionRight::Call, monthly),
        option("35001", "BANKNIFTY", 45900, OptionRight::Call, weekly),
        option("35002", "BANKNIFTY", 46000, OptionRight::Call, weekly),
        option("35003", "BANKNIFTY", 46100, OptionRight::Call, weekly),
        option("35102", "BANKNIFTY", 46000, OptionRight::Put, weekly),
        future("35202", "BANKNIFTY", date((2025, 6, 26))),
        future("35200", "BANKNIFTY", date((2025, 4, 30))),
        future("35201", "BANKNIFTY", date((2025, 5, 29))),
        future("36200", "NIFTY", date((2025, 4, 24))),
        equity("2885", "RELIANCE", "RELIANCE-EQ"),
        equity("2886", "RELIANCE", "RELIANCE-BE"),
    ]
}

pub fn retrieved_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 21, 2, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub fn scenario_snapshot() -> SecurityMaster {
    let (snapshot, rejected) = SecurityMaster::build(scenario_records(), retrieved_at());
    assert!(rejected.is_empty(), "scenario records must be valid");
    snapshot
}

/// Zip archive holding `members` uncompressed
pub fn zip_archive(members: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);

    for (name, contents) in members {
        writer.start_file(*name, options).expect("start zip member");
        writer
            .write_all(contents.as_bytes())
            .expect("write zip member");
    }

    writer.finish().expect("finish zip").into_inner()
}
