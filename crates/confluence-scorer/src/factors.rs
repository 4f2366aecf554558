//! The factor library (§4.6). Each function reads one slice of `FactorInputs`
//! and reduces it to a `raw_score ∈ [0,100]` plus a short rationale string.
//! Evaluated in [`crate::FACTOR_ORDER`] order by [`compute_all`].

use indicator_contract::{PatternDirection, PatternGrade};
use market_types::Direction;
use swing_structure::Trend as SwingTrend;

use crate::FactorInputs;

#[derive(Debug, Clone)]
pub struct FactorResult {
    pub raw: f64,
    pub rationale: String,
}

impl FactorResult {
    fn new(raw: f64, rationale: impl Into<String>) -> Self {
        Self { raw: raw.clamp(0.0, 100.0), rationale: rationale.into() }
    }
}

/// Computes every factor in [`crate::FACTOR_ORDER`] order.
pub fn compute_all(inputs: &FactorInputs, direction: Direction) -> [FactorResult; 12] {
    [
        htf_trend_alignment(inputs, direction),
        mtf_confluence(inputs, direction),
        structural_break(inputs, direction),
        order_block_quality(inputs, direction),
        fvg_quality(inputs, direction),
        liquidity_sweep(inputs, direction),
        swing_structure_clarity(inputs, direction),
        momentum(inputs, direction),
        volatility_regime(inputs, direction),
        volume_profile(inputs, direction),
        cycle_alignment(inputs, direction),
        macro_bias(inputs, direction),
    ]
}

fn pattern_matches(direction: Direction, pattern_direction: PatternDirection) -> bool {
    matches!(
        (direction, pattern_direction),
        (Direction::Long, PatternDirection::Bullish) | (Direction::Short, PatternDirection::Bearish)
    )
}

fn grade_score(grade: PatternGrade) -> f64 {
    match grade {
        PatternGrade::A => 90.0,
        PatternGrade::B => 65.0,
        PatternGrade::C => 40.0,
    }
}

fn trend_matches(direction: Direction, trend: SwingTrend) -> bool {
    matches!((direction, trend), (Direction::Long, SwingTrend::Bullish) | (Direction::Short, SwingTrend::Bearish))
}

fn trend_opposes(direction: Direction, trend: SwingTrend) -> bool {
    matches!((direction, trend), (Direction::Long, SwingTrend::Bearish) | (Direction::Short, SwingTrend::Bullish))
}

fn htf_trend_alignment(inputs: &FactorInputs, direction: Direction) -> FactorResult {
    use market_regime_detector::TrendLabel;
    let trend = inputs.global_regime.trend;
    let raw = match (direction, trend) {
        (Direction::Long, TrendLabel::StrongUp) | (Direction::Short, TrendLabel::StrongDown) => 90.0,
        (Direction::Long, TrendLabel::Up) | (Direction::Short, TrendLabel::Down) => 70.0,
        (_, TrendLabel::Sideways) => 50.0,
        (Direction::Long, TrendLabel::Down) | (Direction::Short, TrendLabel::Up) => 25.0,
        (Direction::Long, TrendLabel::StrongDown) | (Direction::Short, TrendLabel::StrongUp) => 10.0,
    };
    FactorResult::new(raw, format!("global regime trend is {:?}", trend))
}

fn mtf_confluence(inputs: &FactorInputs, direction: Direction) -> FactorResult {
    if inputs.mtf_swings.is_empty() {
        return FactorResult::new(50.0, "no per-timeframe swing structure available");
    }
    let agreeing = inputs.mtf_swings.values().filter(|t| trend_matches(direction, **t)).count();
    let raw = 100.0 * agreeing as f64 / inputs.mtf_swings.len() as f64;
    FactorResult::new(raw, format!("{agreeing}/{} timeframes agree with direction", inputs.mtf_swings.len()))
}

fn structural_break(inputs: &FactorInputs, direction: Direction) -> FactorResult {
    let best = inputs
        .structure_events
        .iter()
        .filter(|e| pattern_matches(direction, e.direction))
        .max_by_key(|e| grade_score(e.grade) as i64);
    match best {
        Some(event) => FactorResult::new(grade_score(event.grade), format!("{:?} grade {:?} in direction", event.kind, event.grade)),
        None => FactorResult::new(40.0, "no BOS/CHoCH confirming direction"),
    }
}

fn order_block_quality(inputs: &FactorInputs, direction: Direction) -> FactorResult {
    let best = inputs
        .order_blocks
        .iter()
        .filter(|ob| pattern_matches(direction, ob.direction) && !ob.mitigated)
        .max_by_key(|ob| grade_score(ob.grade) as i64);
    match best {
        Some(ob) => FactorResult::new(grade_score(ob.grade), format!("unmitigated grade {:?} order block in zone", ob.grade)),
        None => FactorResult::new(35.0, "no unmitigated order block confirming direction"),
    }
}

fn fvg_quality(inputs: &FactorInputs, direction: Direction) -> FactorResult {
    let best = inputs
        .fair_value_gaps
        .iter()
        .filter(|g| pattern_matches(direction, g.direction) && !g.mitigated)
        .max_by_key(|g| grade_score(g.grade) as i64);
    match best {
        Some(gap) => FactorResult::new(grade_score(gap.grade), format!("unmitigated grade {:?} FVG in zone", gap.grade)),
        None => FactorResult::new(35.0, "no unmitigated FVG confirming direction"),
    }
}

fn liquidity_sweep(inputs: &FactorInputs, direction: Direction) -> FactorResult {
    let best = inputs
        .liquidity_sweeps
        .iter()
        .filter(|s| pattern_matches(direction, s.direction))
        .max_by_key(|s| grade_score(s.grade) as i64);
    match best {
        Some(sweep) => FactorResult::new(grade_score(sweep.grade), format!("grade {:?} liquidity sweep in direction", sweep.grade)),
        None => FactorResult::new(40.0, "no liquidity sweep confirming direction"),
    }
}

fn swing_structure_clarity(inputs: &FactorInputs, direction: Direction) -> FactorResult {
    if inputs.swing.points.is_empty() {
        return FactorResult::new(40.0, "no swing points available");
    }
    let avg_strength: f64 = inputs.swing.points.iter().map(|p| p.strength).sum::<f64>() / inputs.swing.points.len() as f64;
    let clarity = (avg_strength * 30.0).clamp(0.0, 40.0);
    let raw = if trend_matches(direction, inputs.swing.trend) {
        60.0 + clarity
    } else if trend_opposes(direction, inputs.swing.trend) {
        40.0 - clarity.min(30.0)
    } else {
        50.0
    };
    FactorResult::new(raw, format!("swing trend {:?}, avg strength {:.2} ATR", inputs.swing.trend, avg_strength))
}

fn momentum(inputs: &FactorInputs, direction: Direction) -> FactorResult {
    let rsi = inputs.indicators.rsi;
    let macd = inputs.indicators.macd_histogram;
    let (rsi_bullish, rsi_bearish) = match rsi {
        Some(r) => (r > 55.0, r < 45.0),
        None => (false, false),
    };
    let (macd_bullish, macd_bearish) = match macd {
        Some(m) => (m > 0.0, m < 0.0),
        None => (false, false),
    };

    let agree = match direction {
        Direction::Long => rsi_bullish as u8 + macd_bullish as u8,
        Direction::Short => rsi_bearish as u8 + macd_bearish as u8,
    };

    let raw = match (rsi.is_some(), macd.is_some()) {
        (false, false) => 50.0,
        _ => match agree {
            2 => 80.0,
            1 => 60.0,
            _ => 35.0,
        },
    };
    FactorResult::new(raw, format!("rsi={rsi:?} macd_histogram={macd:?}"))
}

fn volatility_regime(inputs: &FactorInputs, _direction: Direction) -> FactorResult {
    let ind = inputs.indicators;
    let raw = if ind.ttm_squeeze_firing {
        80.0
    } else if ind.ttm_squeeze_on {
        55.0
    } else {
        50.0
    };
    FactorResult::new(raw, format!("ttm_squeeze_on={} firing={}", ind.ttm_squeeze_on, ind.ttm_squeeze_firing))
}

fn volume_profile(inputs: &FactorInputs, _direction: Direction) -> FactorResult {
    let ratio = inputs.recent_volume_ratio;
    let raw = if ratio < 0.5 {
        35.0
    } else if ratio < 1.5 {
        60.0
    } else {
        75.0
    };
    FactorResult::new(raw, format!("recent volume ratio {ratio:.2}"))
}

fn cycle_alignment(inputs: &FactorInputs, direction: Direction) -> FactorResult {
    use cycle_detector::CycleBias;
    let raw = match (inputs.cycle.overall_bias, direction) {
        (CycleBias::Long, Direction::Long) | (CycleBias::Short, Direction::Short) => 75.0,
        (CycleBias::Long, Direction::Short) | (CycleBias::Short, Direction::Long) => 25.0,
        (CycleBias::Neutral, _) => 50.0,
    };
    FactorResult::new(raw, format!("cycle overall bias {:?}, alignment {:?}", inputs.cycle.overall_bias, inputs.cycle.alignment))
}

fn macro_bias(inputs: &FactorInputs, direction: Direction) -> FactorResult {
    use cycle_detector::MacroBias;
    let raw = match (inputs.four_year.macro_bias, direction) {
        (MacroBias::Bullish, Direction::Long) | (MacroBias::Bearish, Direction::Short) => 70.0,
        (MacroBias::Bullish, Direction::Short) | (MacroBias::Bearish, Direction::Long) => 30.0,
        (MacroBias::Neutral, _) => 50.0,
    };
    FactorResult::new(raw, format!("4-year cycle phase {:?}, macro bias {:?}", inputs.four_year.phase, inputs.four_year.macro_bias))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_a_outranks_grade_c() {
        assert!(grade_score(PatternGrade::A) > grade_score(PatternGrade::C));
    }

    #[test]
    fn pattern_direction_matching_is_symmetric() {
        assert!(pattern_matches(Direction::Long, PatternDirection::Bullish));
        assert!(!pattern_matches(Direction::Long, PatternDirection::Bearish));
        assert!(pattern_matches(Direction::Short, PatternDirection::Bearish));
    }
}
