//! Broker-agnostic display symbols
//!
//! Rules:
//! - equity: the underlying verbatim
//! - future: underlying + `DDMMMYY` (e.g. `NIFTY25AUG24`)
//! - weekly option: underlying + `YY` + month without leading zero + `DD` + strike + CE/PE
//! - monthly option: underlying + `YY` + `MMM` + strike + CE/PE
//!
//! An expiry is weekly when the date seven days later is still in the same
//! month. This misreads a weekly expiry in the last week of a month as
//! monthly; consumers rely on that, so it stays.

use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{InstrumentClass, InstrumentRecord};
use crate::error::NormalizeError;

/// Naming variant applied on top of the canonical rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolConvention {
    #[default]
    Canonical,
    /// Futures get a trailing "FUT"
    FutSuffixed,
}

/// Weekly cadence test: +7 days stays in the same calendar month
pub fn is_weekly_expiry(expiry: NaiveDate) -> bool {
    expiry
        .checked_add_days(Days::new(7))
        .is_some_and(|next| next.month() == expiry.month())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolNormalizer {
    convention: SymbolConvention,
}

impl SymbolNormalizer {
    pub fn new(convention: SymbolConvention) -> Self {
        Self { convention }
    }

    /// Canonical symbol, or the vendor trading symbol when the record
    /// cannot be normalized
    pub fn normalize(&self, record: &InstrumentRecord) -> String {
        match self.try_normalize(record) {
            Ok(symbol) => symbol,
            Err(e) => {
                debug!(
                    "Falling back to vendor symbol {} for token {}: {}",
                    record.trading_symbol, record.token, e
                );
                record.trading_symbol.clone()
            }
        }
    }

    pub fn try_normalize(&self, record: &InstrumentRecord) -> Result<String, NormalizeError> {
        let underlying = record.underlying_symbol.as_str();

        match record.instrument_class {
            InstrumentClass::Equity => Ok(underlying.to_string()),
            InstrumentClass::Future => {
                let expiry = record.expiry_date.ok_or(NormalizeError::MissingExpiry)?;
                let mut symbol = format!(
                    "{}{}",
                    underlying,
                    expiry.format("%d%b%y").to_string().to_uppercase()
                );
                if self.convention == SymbolConvention::FutSuffixed {
                    symbol.push_str("FUT");
                }
                Ok(symbol)
            }
            InstrumentClass::Option => {
                let expiry = record.expiry_date.ok_or(NormalizeError::MissingExpiry)?;
                let strike = record
                    .strike_price
                    .ok_or(NormalizeError::MissingStrike)?
                    .trunc()
                    .to_i64()
                    .ok_or(NormalizeError::StrikeOutOfRange)?;
                let right = record.option_right.ok_or(NormalizeError::MissingRight)?;

                let expiry_part = if is_weekly_expiry(expiry) {
                    format!("{}{}{:02}", expiry.format("%y"), expiry.month(), expiry.day())
                } else {
                    expiry.format("%y%b").to_string().to_uppercase()
                };

                Ok(format!("{underlying}{expiry_part}{strike}{}", right.suffix()))
            }
        }
    }
}
