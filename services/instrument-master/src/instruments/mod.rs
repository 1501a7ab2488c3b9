//! Security master snapshots, symbol normalization and instrument resolution

pub mod bucket;
pub mod cache;
pub mod normalizer;
pub mod resolver;
pub mod service;
pub mod store;
pub mod types;

pub use normalizer::{SymbolConvention, SymbolNormalizer};
pub use resolver::{InstrumentResolver, ResolveRequest, ResolvedInstrument};
pub use service::{InstrumentMasterService, Lookup, RefreshSummary};
pub use store::{SecurityMaster, SecurityMasterStore, StaleData, StaleReason};
pub use types::*;
