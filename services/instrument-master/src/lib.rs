//! Instrument Master Service
//!
//! Downloads broker security master archives (TradeSmart/Noren and
//! ICICI/Breeze), keeps the current instrument table as an immutable
//! snapshot and resolves trading intents such as
//! "BANKNIFTY 46000 CE, nearest weekly" to a broker token, trading symbol
//! and lot size.

pub mod config;
pub mod error;
pub mod feeds;
pub mod instruments;

pub use config::{InstrumentMasterConfig, RefreshConfig};
pub use error::{FeedError, NormalizeError, RecordParseError};
pub use instruments::{
    ExpiryBucket, InstrumentClass, InstrumentMasterService, InstrumentRecord, InstrumentResolver,
    OptionRight, ResolveRequest, ResolvedInstrument, SecurityMaster, SecurityMasterStore,
    SymbolNormalizer, Venue,
};
