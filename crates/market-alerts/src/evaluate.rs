//! Condition Evaluation
//!
//! Pure functions: given fixed indicator inputs the outcome is fully
//! determined, so rules can be evaluated and tested without any I/O.

use assistant_core::ConditionKind;
use rust_decimal::Decimal;

use crate::error::{AlertError, Result};
use crate::model::{Divergence, DivergenceKind, IndicatorSeries, MarketSnapshot};

/// Periods compared by the divergence check
pub const DIVERGENCE_LOOKBACK: usize = 14;

/// Whether `kind` holds for the snapshot
///
/// - price/RSI conditions are strict comparisons
/// - `PriceCrossesEma` holds while price is within `threshold` of the EMA
/// - `RsiDivergence` ignores the threshold and holds when a divergence was
///   detected
pub fn evaluate_condition(
    kind: ConditionKind,
    snapshot: &MarketSnapshot,
    threshold: Decimal,
) -> bool {
    let ind = &snapshot.indicators;
    match kind {
        ConditionKind::PriceAbove => ind.price > threshold,
        ConditionKind::PriceBelow => ind.price < threshold,
        ConditionKind::RsiAbove => ind.rsi > threshold,
        ConditionKind::RsiBelow => ind.rsi < threshold,
        ConditionKind::PriceCrossesEma => (ind.price - ind.ema).abs() < threshold,
        ConditionKind::RsiDivergence => snapshot
            .divergence
            .as_ref()
            .is_some_and(Divergence::is_present),
    }
}

#[derive(PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

fn direction(values: &[Decimal]) -> Direction {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if last > first => Direction::Up,
        _ => Direction::Down,
    }
}

/// Compare price and RSI direction over the last `DIVERGENCE_LOOKBACK`
/// periods of `series`
pub fn detect_divergence(series: &IndicatorSeries) -> Result<Divergence> {
    let n = series.len();
    if n < 2 {
        return Err(AlertError::MarketData(format!(
            "need at least 2 periods for divergence, got {n}"
        )));
    }

    let window = n.min(DIVERGENCE_LOOKBACK);
    let closes = &series.closes[series.closes.len() - window..];
    let rsi = &series.rsi[series.rsi.len() - window..];

    let kind = match (direction(closes), direction(rsi)) {
        (Direction::Up, Direction::Down) => Some(DivergenceKind::Bearish),
        (Direction::Down, Direction::Up) => Some(DivergenceKind::Bullish),
        _ => None,
    };

    Ok(Divergence {
        kind,
        price: closes[window - 1],
        rsi: rsi[window - 1],
    })
}
