//! The technical feature panel (§4.5). `atr_14`'s Wilder smoothing
//! directly follows the teacher's `calculate_rsi` shape: a simple
//! average seed over the first window, then an exponential moving
//! average carried forward one candle at a time.

use rust_decimal::prelude::ToPrimitive;

use crate::config::MIN_CANDLES_FOR_FULL_FEATURES;
use crate::domain::{
    AssetClass, CryptoFeatures, CryptoMicrostructure, MarketStructure, Period, RawCandle,
    TrendDirection, UniversalFeatures,
};
use crate::error::ComputeError;

const VOLATILITY_SHORT_WINDOW: usize = 20;
const VOLATILITY_LONG_WINDOW: usize = 50;
const ATR_WINDOW: usize = 14;
const SMA_WINDOW: usize = 20;
const VOLUME_WINDOW: usize = 20;

struct Ohlc {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn to_f64(candles: &[RawCandle]) -> Result<Vec<Ohlc>, ComputeError> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let conv = |label: &str, d: rust_decimal::Decimal| {
                d.to_f64().ok_or_else(|| ComputeError::Failed {
                    index: i,
                    reason: format!("{label} does not fit in f64: {d}"),
                })
            };
            Ok(Ohlc {
                open: conv("open", c.open)?,
                high: conv("high", c.high)?,
                low: conv("low", c.low)?,
                close: conv("close", c.close)?,
                volume: c.volume as f64,
            })
        })
        .collect()
}

fn log_return(prev_close: f64, close: f64) -> Option<f64> {
    if prev_close <= 0.0 || close <= 0.0 {
        None
    } else {
        Some((close / prev_close).ln())
    }
}

fn stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

fn true_range(prev_close: f64, high: f64, low: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// Computes the universal feature panel for every index of `candles`,
/// ordered oldest-first. A sequence shorter than
/// [`MIN_CANDLES_FOR_FULL_FEATURES`] still gets the indices it can
/// cover; the uncovered prefix is left `None` rather than erroring,
/// per §4.5. A malformed candle (price too large for `f64`) aborts the
/// whole pass, matching the feature computer's "compute-failed" rule.
pub fn compute_universal_features(candles: &[RawCandle], asset_class: AssetClass, period: Period) -> Result<Vec<UniversalFeatures>, ComputeError> {
    let bars = to_f64(candles)?;
    let n = bars.len();
    let mut out = vec![UniversalFeatures::default(); n];
    if n == 0 {
        return Ok(out);
    }

    let returns: Vec<Option<f64>> = (0..n)
        .map(|i| if i == 0 { None } else { log_return(bars[i - 1].close, bars[i].close) })
        .collect();

    let periods_per_day = period.periods_per_trading_day(asset_class).round().max(1.0) as usize;

    for i in 0..n {
        let mut f = UniversalFeatures::default();

        f.return_period = Some(bars[i].close / bars[i].open - 1.0);

        if i >= periods_per_day {
            f.return_day = Some(bars[i].close / bars[i - periods_per_day].close - 1.0);
        }

        if i + 1 >= VOLATILITY_SHORT_WINDOW {
            let window: Vec<f64> = returns[i + 1 - VOLATILITY_SHORT_WINDOW..=i].iter().copied().flatten().collect();
            f.volatility_20 = stdev(&window);
        }
        if i + 1 >= VOLATILITY_LONG_WINDOW {
            let window: Vec<f64> = returns[i + 1 - VOLATILITY_LONG_WINDOW..=i].iter().copied().flatten().collect();
            f.volatility_50 = stdev(&window);
        }

        if i + 1 >= VOLUME_WINDOW {
            let window = &bars[i + 1 - VOLUME_WINDOW..=i];
            f.rolling_volume_20 = Some(window.iter().map(|b| b.volume).sum::<f64>() / VOLUME_WINDOW as f64);
        }

        if i + 1 >= SMA_WINDOW {
            let window = &bars[i + 1 - SMA_WINDOW..=i];
            let sma = window.iter().map(|b| b.close).sum::<f64>() / SMA_WINDOW as f64;
            f.trend_direction = Some(if bars[i].close > sma * 1.01 {
                TrendDirection::Up
            } else if bars[i].close < sma * 0.99 {
                TrendDirection::Down
            } else {
                TrendDirection::Neutral
            });
        }

        if i + 1 >= 2 * SMA_WINDOW {
            let current_window = &bars[i + 1 - SMA_WINDOW..=i];
            let prior_window = &bars[i + 1 - 2 * SMA_WINDOW..i + 1 - SMA_WINDOW];
            let current_high = current_window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let current_low = current_window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            let prior_high = prior_window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let prior_low = prior_window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            f.market_structure = Some(if current_high > prior_high && current_low > prior_low {
                MarketStructure::Bullish
            } else if current_high < prior_high && current_low < prior_low {
                MarketStructure::Bearish
            } else {
                MarketStructure::Range
            });
        }

        out[i] = f;
    }

    // ATR-14: Wilder smoothing seeded by a simple mean, same shape as
    // the RSI's gain/loss EMA.
    if n > ATR_WINDOW {
        let true_ranges: Vec<f64> = (1..n).map(|i| true_range(bars[i - 1].close, bars[i].high, bars[i].low)).collect();
        let mut atr = true_ranges[..ATR_WINDOW].iter().sum::<f64>() / ATR_WINDOW as f64;
        out[ATR_WINDOW].atr_14 = Some(atr);
        for i in ATR_WINDOW..true_ranges.len() {
            atr = (atr * (ATR_WINDOW - 1) as f64 + true_ranges[i]) / ATR_WINDOW as f64;
            out[i + 1].atr_14 = Some(atr);
        }
    }

    Ok(out)
}

/// Computes the crypto-only feature panel (§4.5). `universal` must be the
/// output of [`compute_universal_features`] for the same sequence, since
/// `volume_spike_score` divides by its `rolling_volume_20`. Entirely
/// `None` for indices whose candle carries no microstructure payload.
pub fn compute_crypto_features(candles: &[RawCandle], universal: &[UniversalFeatures]) -> Vec<CryptoFeatures> {
    let mut out = vec![CryptoFeatures::default(); candles.len()];

    let mut prev_oi: Option<f64> = None;
    for (i, candle) in candles.iter().enumerate() {
        let Some(micro) = candle.microstructure.as_ref() else {
            continue;
        };
        let mut f = CryptoFeatures::default();
        f.delta = delta(micro);
        f.buy_sell_ratio = buy_sell_ratio(micro);
        f.liquidation_intensity = Some(liquidation_intensity(micro, candle.volume as f64));
        f.volume_spike_score = Some(volume_spike_score(candle.volume as f64, universal[i].rolling_volume_20));
        if let (Some(prev), Some(curr)) = (prev_oi, micro.open_interest) {
            if prev != 0.0 {
                f.open_interest_change = Some((curr - prev) / prev);
            }
        }
        prev_oi = micro.open_interest.or(prev_oi);
        out[i] = f;
    }
    out
}

fn delta(micro: &CryptoMicrostructure) -> Option<f64> {
    match (micro.taker_buy_volume, micro.taker_sell_volume) {
        (Some(buy), Some(sell)) => Some(buy - sell),
        _ => None,
    }
}

fn buy_sell_ratio(micro: &CryptoMicrostructure) -> Option<f64> {
    match (micro.taker_buy_volume, micro.taker_sell_volume) {
        (Some(buy), Some(sell)) => {
            let total = buy + sell;
            Some(if total == 0.0 { 0.5 } else { buy / total })
        }
        _ => None,
    }
}

fn liquidation_intensity(micro: &CryptoMicrostructure, volume: f64) -> f64 {
    match (micro.long_liquidations, micro.short_liquidations) {
        (Some(long), Some(short)) if volume != 0.0 => (long + short) / volume,
        _ => 0.0,
    }
}

fn volume_spike_score(volume: f64, rolling_volume_20: Option<f64>) -> f64 {
    match rolling_volume_20 {
        Some(denom) if denom != 0.0 => volume / denom,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn candle(i: i64, close: f64) -> RawCandle {
        RawCandle {
            period_open: Utc.timestamp_opt(1_700_000_000 + i * 3600, 0).unwrap(),
            open: dec!(1),
            high: rust_decimal::Decimal::try_from(close + 1.0).unwrap(),
            low: rust_decimal::Decimal::try_from(close - 1.0).unwrap(),
            close: rust_decimal::Decimal::try_from(close).unwrap(),
            volume: 100,
            microstructure: None,
        }
    }

    #[test]
    fn short_sequence_leaves_trailing_features_none() {
        let candles: Vec<_> = (0..5).map(|i| candle(i, 100.0 + i as f64)).collect();
        let features = compute_universal_features(&candles, AssetClass::Crypto, Period::OneHour).unwrap();
        assert!(features[4].volatility_20.is_none());
        assert!(features[4].atr_14.is_none());
    }

    #[test]
    fn full_window_produces_atr_and_volatility() {
        let candles: Vec<_> = (0..60).map(|i| candle(i, 100.0 + (i as f64 * 0.1))).collect();
        let features = compute_universal_features(&candles, AssetClass::Crypto, Period::OneHour).unwrap();
        assert!(features[59].volatility_20.is_some());
        assert!(features[59].volatility_50.is_some());
        assert!(features[59].atr_14.is_some());
        assert!(features[59].rolling_volume_20.is_some());
        assert!(features[MIN_CANDLES_FOR_FULL_FEATURES].trend_direction.is_some());
    }

    #[test]
    fn uptrend_is_classified_bullish_near_highs() {
        let candles: Vec<_> = (0..50).map(|i| candle(i, 100.0 + i as f64 * 2.0)).collect();
        let features = compute_universal_features(&candles, AssetClass::Crypto, Period::OneHour).unwrap();
        assert_eq!(features[49].market_structure, Some(MarketStructure::Bullish));
        assert_eq!(features[49].trend_direction, Some(TrendDirection::Up));
    }

    #[test]
    fn crypto_features_require_microstructure_payload() {
        let candles: Vec<_> = (0..3).map(|i| candle(i, 100.0)).collect();
        let universal = compute_universal_features(&candles, AssetClass::Crypto, Period::OneHour).unwrap();
        let features = compute_crypto_features(&candles, &universal);
        assert!(features.iter().all(|f| f.delta.is_none()));
    }

    #[test]
    fn delta_and_ratio_use_taker_volumes() {
        let mut c = candle(0, 100.0);
        c.microstructure = Some(CryptoMicrostructure {
            taker_buy_volume: Some(60.0),
            taker_sell_volume: Some(40.0),
            open_interest: Some(1000.0),
            funding_rate: Some(0.0001),
            long_liquidations: Some(1.0),
            short_liquidations: Some(2.0),
        });
        let universal = compute_universal_features(std::slice::from_ref(&c), AssetClass::Crypto, Period::OneHour).unwrap();
        let features = compute_crypto_features(&[c], &universal);
        assert_eq!(features[0].delta, Some(20.0));
        assert_eq!(features[0].buy_sell_ratio, Some(0.6));
        assert_eq!(features[0].liquidation_intensity, Some(0.03));
    }

    #[test]
    fn buy_sell_ratio_falls_back_to_half_when_totals_are_zero() {
        let mut c = candle(0, 100.0);
        c.microstructure = Some(CryptoMicrostructure {
            taker_buy_volume: Some(0.0),
            taker_sell_volume: Some(0.0),
            open_interest: None,
            funding_rate: None,
            long_liquidations: None,
            short_liquidations: None,
        });
        let universal = compute_universal_features(std::slice::from_ref(&c), AssetClass::Crypto, Period::OneHour).unwrap();
        let features = compute_crypto_features(&[c], &universal);
        assert_eq!(features[0].buy_sell_ratio, Some(0.5));
    }
}
