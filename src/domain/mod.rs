//! The data model (§3): symbols, candles, and the state rows the
//! scheduler/persistence layers track.

pub mod candle;
pub mod period;
pub mod state;
pub mod symbol;

pub use candle::{
    CryptoFeatures, CryptoMicrostructure, EnrichedCandle, MarketStructure, QualityAnnotations,
    RawCandle, TrendDirection, UniversalFeatures,
};
pub use period::{AssetClass, Period};
pub use state::{
    AmendmentLogEntry, AmendmentReason, BackfillState, BackfillStatus, ComputeAudit,
    EnrichmentState, EnrichmentStatus, FetchAudit,
};
pub use symbol::{SourceAliases, SymbolDescriptor, SymbolRegistry};
