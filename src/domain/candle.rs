use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::period::{AssetClass, Period};

/// The neutral fetch result every `CandleProvider` produces, before
/// validation or feature computation. Prices are exact decimals (§3);
/// only the feature-computation layer converts them to `f64`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCandle {
    pub period_open: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
    pub microstructure: Option<CryptoMicrostructure>,
}

/// Crypto-only fields carried alongside a raw candle (§3). All optional
/// because not every crypto provider response includes them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct CryptoMicrostructure {
    pub taker_buy_volume: Option<f64>,
    pub taker_sell_volume: Option<f64>,
    pub open_interest: Option<f64>,
    pub funding_rate: Option<f64>,
    pub long_liquidations: Option<f64>,
    pub short_liquidations: Option<f64>,
}

/// `trend_direction` classification (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
}

/// `market_structure` classification (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStructure {
    Bullish,
    Bearish,
    Range,
}

/// The universal feature panel computed over an ordered candle sequence.
/// Fields are `None` for the uncovered prefix of a short sequence (§4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniversalFeatures {
    pub return_period: Option<f64>,
    pub return_day: Option<f64>,
    pub volatility_20: Option<f64>,
    pub volatility_50: Option<f64>,
    pub atr_14: Option<f64>,
    pub trend_direction: Option<TrendDirection>,
    pub market_structure: Option<MarketStructure>,
    pub rolling_volume_20: Option<f64>,
}

/// The crypto-only feature panel (§4.5). Entirely `None` for non-crypto rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CryptoFeatures {
    pub delta: Option<f64>,
    pub buy_sell_ratio: Option<f64>,
    pub liquidation_intensity: Option<f64>,
    pub volume_spike_score: Option<f64>,
    pub open_interest_change: Option<f64>,
}

/// Quality annotations attached by the validation layer (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAnnotations {
    pub source: String,
    pub validated: bool,
    pub quality_score: f64,
    pub completeness: f64,
    pub gap_flag: bool,
    pub volume_anomaly_flag: bool,
    pub validation_note: Option<String>,
}

/// The persisted row (§3), keyed uniquely by
/// (symbol, asset_class, period, period_open).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedCandle {
    pub id: Option<i64>,
    pub symbol: String,
    pub asset_class: AssetClass,
    pub period: Period,
    pub period_open: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
    pub universal: UniversalFeatures,
    pub crypto: CryptoFeatures,
    pub quality: QualityAnnotations,
    pub revision: i64,
    pub amended_from: Option<i64>,
    pub fetched_at: DateTime<Utc>,
    pub computed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichedCandle {
    /// §3 invariant: `low <= min(open, close) <= max(open, close) <= high`,
    /// all prices positive, volume non-negative (always true for `u64`).
    pub fn satisfies_ohlc_invariant(&self) -> bool {
        let min_oc = self.open.min(self.close);
        let max_oc = self.open.max(self.close);
        self.low <= min_oc
            && min_oc <= max_oc
            && max_oc <= self.high
            && self.open > Decimal::ZERO
            && self.high > Decimal::ZERO
            && self.low > Decimal::ZERO
            && self.close > Decimal::ZERO
    }
}
