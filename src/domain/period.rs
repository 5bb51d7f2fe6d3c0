use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the seven candle durations the warehouse maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    FourHours,
    OneDay,
    OneWeek,
}

impl Period {
    pub const ALL: [Period; 7] = [
        Period::FiveMinutes,
        Period::FifteenMinutes,
        Period::ThirtyMinutes,
        Period::OneHour,
        Period::FourHours,
        Period::OneDay,
        Period::OneWeek,
    ];

    /// The canonical short code, matching the teacher's `"5m"`/`"1h"`-style
    /// timeframe strings used for binance klines and db keys.
    pub fn code(self) -> &'static str {
        match self {
            Period::FiveMinutes => "5m",
            Period::FifteenMinutes => "15m",
            Period::ThirtyMinutes => "30m",
            Period::OneHour => "1h",
            Period::FourHours => "4h",
            Period::OneDay => "1d",
            Period::OneWeek => "1w",
        }
    }

    pub fn from_code(code: &str) -> Option<Period> {
        Some(match code {
            "5m" => Period::FiveMinutes,
            "15m" => Period::FifteenMinutes,
            "30m" => Period::ThirtyMinutes,
            "1h" => Period::OneHour,
            "4h" => Period::FourHours,
            "1d" => Period::OneDay,
            "1w" => Period::OneWeek,
            _ => return None,
        })
    }

    /// One period tick, in milliseconds. Generalizes the teacher's
    /// `timeframe_to_interval`/`expected_interval_ms` match arms.
    pub fn tick_millis(self) -> i64 {
        match self {
            Period::FiveMinutes => 300_000,
            Period::FifteenMinutes => 900_000,
            Period::ThirtyMinutes => 1_800_000,
            Period::OneHour => 3_600_000,
            Period::FourHours => 14_400_000,
            Period::OneDay => 86_400_000,
            Period::OneWeek => 604_800_000,
        }
    }

    /// Periods per trading day, used by `return_day` (§4.5). For equities
    /// this is the nominal count of this period's ticks in a 6.5h trading
    /// session; for crypto it is the count in a 24h day.
    pub fn periods_per_trading_day(self, asset_class: super::AssetClass) -> f64 {
        let day_ms = if asset_class.is_equity_like() {
            6.5 * 3_600_000.0
        } else {
            24.0 * 3_600_000.0
        };
        if matches!(self, Period::OneDay | Period::OneWeek) {
            1.0
        } else {
            (day_ms / self.tick_millis() as f64).max(1.0)
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The three asset classes the warehouse enriches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Stock,
    Etf,
    Crypto,
}

impl AssetClass {
    pub fn code(self) -> &'static str {
        match self {
            AssetClass::Stock => "stock",
            AssetClass::Etf => "etf",
            AssetClass::Crypto => "crypto",
        }
    }

    pub fn is_equity_like(self) -> bool {
        matches!(self, AssetClass::Stock | AssetClass::Etf)
    }

    pub fn from_code(code: &str) -> Option<AssetClass> {
        Some(match code {
            "stock" => AssetClass::Stock,
            "etf" => AssetClass::Etf,
            "crypto" => AssetClass::Crypto,
            _ => return None,
        })
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_roundtrips_through_code() {
        for p in Period::ALL {
            assert_eq!(Period::from_code(p.code()), Some(p));
        }
    }

    #[test]
    fn asset_class_roundtrips_through_code() {
        for a in [AssetClass::Stock, AssetClass::Etf, AssetClass::Crypto] {
            assert_eq!(AssetClass::from_code(a.code()), Some(a));
        }
    }

    #[test]
    fn daily_and_weekly_have_one_period_per_day() {
        assert_eq!(Period::OneDay.periods_per_trading_day(AssetClass::Stock), 1.0);
        assert_eq!(Period::OneWeek.periods_per_trading_day(AssetClass::Crypto), 1.0);
    }

    #[test]
    fn crypto_hourly_has_24_periods_per_day() {
        let d = Period::OneHour.periods_per_trading_day(AssetClass::Crypto);
        assert!((d - 24.0).abs() < 1e-9);
    }
}
