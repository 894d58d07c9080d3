use crate::models::Candle;
use crate::persistence::read_candle_snapshot;
use rust_decimal::Decimal;
use std::fmt;
use std::path::Path;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Which order profile to run this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyChoice {
    HighSpread,
    LowSpread,
}

impl StrategyChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyChoice::HighSpread => "high_spread_004",
            StrategyChoice::LowSpread => "low_spread_001",
        }
    }
}

impl fmt::Display for StrategyChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High/low range of a candle as a percentage of its low
///
/// None when the low is not positive or the arithmetic overflows.
pub fn spread_pct(candle: &Candle) -> Option<Decimal> {
    if candle.low <= Decimal::ZERO {
        return None;
    }

    candle
        .high
        .checked_sub(candle.low)?
        .checked_div(candle.low)?
        .checked_mul(HUNDRED)
}

/// Pick a strategy from the most recent candle
///
/// HighSpread when the spread is strictly above `threshold_pct`, LowSpread
/// otherwise (a spread exactly at the threshold is LowSpread).
pub fn select_strategy(candles: &[Candle], threshold_pct: Decimal) -> Option<StrategyChoice> {
    let latest = candles.last()?;

    let Some(spread) = spread_pct(latest) else {
        tracing::warn!(
            "Cannot compute spread for candle at {} (high {}, low {})",
            latest.open_time,
            latest.high,
            latest.low
        );
        return None;
    };

    let choice = if spread > threshold_pct {
        StrategyChoice::HighSpread
    } else {
        StrategyChoice::LowSpread
    };

    tracing::info!("Spread {}% -> {}", spread.round_dp(4), choice);
    Some(choice)
}

/// Same as [`select_strategy`], reading candles from a snapshot file
///
/// Missing or unreadable snapshots yield no selection.
pub fn select_strategy_from_snapshot(path: &Path, threshold_pct: Decimal) -> Option<StrategyChoice> {
    match read_candle_snapshot(path) {
        Ok(candles) => select_strategy(&candles, threshold_pct),
        Err(e) => {
            tracing::error!("Failed to read candle snapshot {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::write_atomic;
    use rust_decimal_macros::dec;

    fn candle(high: Decimal, low: Decimal) -> Candle {
        Candle {
            open_time: 0,
            open: low,
            high,
            low,
            close: high,
            volume: dec!(1000),
            close_time: 59_999,
            symbol: "USDCUSDT".to_string(),
        }
    }

    #[test]
    fn test_wide_spread_selects_high() {
        let candles = [candle(dec!(1.01), dec!(1.00))];
        assert_eq!(spread_pct(&candles[0]), Some(dec!(1)));
        assert_eq!(select_strategy(&candles, dec!(0.5)), Some(StrategyChoice::HighSpread));
    }

    #[test]
    fn test_narrow_spread_selects_low() {
        let candles = [candle(dec!(1.002), dec!(1.00))];
        assert_eq!(select_strategy(&candles, dec!(0.5)), Some(StrategyChoice::LowSpread));
    }

    #[test]
    fn test_threshold_tie_selects_low() {
        let candles = [candle(dec!(1.005), dec!(1.00))];
        assert_eq!(spread_pct(&candles[0]), Some(dec!(0.5)));
        assert_eq!(select_strategy(&candles, dec!(0.5)), Some(StrategyChoice::LowSpread));
    }

    #[test]
    fn test_only_latest_candle_counts() {
        let candles = [candle(dec!(1.05), dec!(1.00)), candle(dec!(1.001), dec!(1.00))];
        assert_eq!(select_strategy(&candles, dec!(0.5)), Some(StrategyChoice::LowSpread));
    }

    #[test]
    fn test_no_selection_on_bad_input() {
        assert_eq!(select_strategy(&[], dec!(0.5)), None);
        assert_eq!(select_strategy(&[candle(dec!(1), dec!(0))], dec!(0.5)), None);
    }

    #[test]
    fn test_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("klines_latest.json");
        let json = serde_json::to_vec(&vec![candle(dec!(1.01), dec!(1.00))]).unwrap();
        write_atomic(&path, &json).unwrap();

        assert_eq!(
            select_strategy_from_snapshot(&path, dec!(0.5)),
            Some(StrategyChoice::HighSpread)
        );

        write_atomic(&path, b"not json").unwrap();
        assert_eq!(select_strategy_from_snapshot(&path, dec!(0.5)), None);
        assert_eq!(select_strategy_from_snapshot(&dir.path().join("missing.json"), dec!(0.5)), None);
    }
}
