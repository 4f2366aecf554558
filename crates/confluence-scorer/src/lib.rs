//! Deterministic, weight-driven confluence scorer (§4.6) — aggregates a stable
//! factor library into a bounded score, applies synergy/conflict adjustments,
//! and gates the result through a strict higher-timeframe alignment check.

pub mod factors;
pub mod weights;

use std::collections::HashMap;

use cycle_detector::{CycleBias, FourYearCycleContext, MacroBias, SymbolCycles};
use indicator_contract::{BosChoch, FairValueGap, IndicatorSet, LiquiditySweep, OrderBlock};
use market_regime_detector::MarketRegime;
use market_types::{Direction, ModeProfile, ScanError, Timeframe};
use serde::{Deserialize, Serialize};
use swing_structure::{SwingStructure, Trend as SwingTrend};

pub use factors::FactorResult;

/// Stable, declared evaluation order for every factor — traces and weight
/// tables both index against this order.
pub const FACTOR_ORDER: [&str; 12] = [
    "htf_trend_alignment",
    "mtf_confluence",
    "structural_break",
    "order_block_quality",
    "fvg_quality",
    "liquidity_sweep",
    "swing_structure_clarity",
    "momentum",
    "volatility_regime",
    "volume_profile",
    "cycle_alignment",
    "macro_bias",
];

const SYNERGY_CAP: f64 = 15.0;

/// Whether HTF price currently sits close to a structural level, which makes
/// a counter-trend setup plausible enough to downgrade `blocked` to `caution`.
#[derive(Debug, Clone, Copy)]
pub struct HtfProximity {
    pub valid: bool,
    pub proximity_atr: f64,
}

/// Everything the scorer needs for one symbol/direction pass. Borrowed, not
/// owned — the caller (the pipeline) holds the per-symbol analysis state.
pub struct FactorInputs<'a> {
    pub indicators: &'a IndicatorSet,
    pub order_blocks: &'a [OrderBlock],
    pub fair_value_gaps: &'a [FairValueGap],
    pub liquidity_sweeps: &'a [LiquiditySweep],
    pub structure_events: &'a [BosChoch],
    pub swing: &'a SwingStructure,
    pub mtf_swings: &'a HashMap<Timeframe, SwingTrend>,
    pub global_regime: &'a MarketRegime,
    pub symbol_regime: &'a MarketRegime,
    pub cycle: &'a SymbolCycles,
    pub four_year: &'a FourYearCycleContext,
    pub recent_volume_ratio: f64,
    pub htf_proximity: Option<HtfProximity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Allowed,
    Caution,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorRecord {
    pub name: &'static str,
    pub raw: f64,
    pub weight: f64,
    pub contribution: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreTrace {
    pub symbol: String,
    pub direction: Direction,
    pub factors: Vec<FactorRecord>,
    pub weighted_base: f64,
    pub synergy: f64,
    pub penalty: f64,
    pub macro_component: f64,
    pub htf_adjustment: f64,
    pub final_score: f64,
    pub verdict: Verdict,
    pub volatility_score: f64,
}

/// Computes one symbol/direction score trace.
pub fn score(symbol: &str, direction: Direction, mode: ModeProfile, inputs: &FactorInputs) -> ScoreTrace {
    let weight_table = weights::weights_for(mode);
    let raws = factors::compute_all(inputs, direction);

    let mut factors = Vec::with_capacity(FACTOR_ORDER.len());
    let mut weighted_base = 0.0;
    for (i, name) in FACTOR_ORDER.iter().enumerate() {
        let FactorResult { raw, rationale } = raws[i].clone();
        let weight = weight_table[i];
        let contribution = raw * weight;
        weighted_base += contribution;
        factors.push(FactorRecord { name, raw, weight, contribution, rationale });
    }

    let raw_of = |name: &str| factors.iter().find(|f| f.name == name).map(|f| f.raw).unwrap_or(0.0);

    let synergy = synergy_bonus(&raw_of);
    let penalty = conflict_penalty(inputs, direction, &raw_of);
    let macro_component = macro_component(inputs.four_year, direction);

    let pre_gate = (weighted_base + synergy - penalty + macro_component).clamp(0.0, 100.0);

    let (verdict, htf_adjustment) = resolve_timeframe_conflicts(inputs, direction);

    let final_score = if verdict == Verdict::Blocked { 0.0 } else { (pre_gate + htf_adjustment).clamp(0.0, 100.0) };

    ScoreTrace {
        symbol: symbol.to_string(),
        direction,
        factors,
        weighted_base,
        synergy,
        penalty,
        macro_component,
        htf_adjustment,
        final_score,
        verdict,
        volatility_score: inputs.symbol_regime.volatility_score,
    }
}

fn synergy_bonus(raw_of: &impl Fn(&str) -> f64) -> f64 {
    let mut total = 0.0;
    if raw_of("htf_trend_alignment") >= 70.0 && raw_of("structural_break") >= 70.0 && raw_of("order_block_quality") >= 70.0 {
        total += 7.0;
    }
    if raw_of("fvg_quality") >= 70.0 && raw_of("liquidity_sweep") >= 70.0 {
        total += 5.0;
    }
    if raw_of("momentum") >= 70.0 && raw_of("volatility_regime") >= 70.0 {
        total += 5.0;
    }
    total.min(SYNERGY_CAP)
}

fn conflict_penalty(inputs: &FactorInputs, direction: Direction, raw_of: &impl Fn(&str) -> f64) -> f64 {
    let mut penalty = 0.0;

    let htf_raw = raw_of("htf_trend_alignment");
    penalty += if htf_raw < 20.0 {
        40.0
    } else if htf_raw < 30.0 {
        30.0
    } else if htf_raw < 40.0 {
        20.0
    } else {
        0.0
    };

    if matches!(inputs.global_regime.volatility, market_regime_detector::VolatilityLabel::Chaotic) {
        penalty += 10.0;
    }

    let cycle_direction_opposes = matches!(
        (inputs.cycle.overall_bias, direction),
        (CycleBias::Long, Direction::Short) | (CycleBias::Short, Direction::Long)
    );
    if cycle_direction_opposes && inputs.cycle.alignment == cycle_detector::Alignment::Aligned {
        penalty += 15.0;
    }

    if regime_direction(inputs.symbol_regime) != regime_direction(inputs.global_regime) {
        penalty += 5.0;
    }

    penalty
}

fn macro_component(four_year: &FourYearCycleContext, direction: Direction) -> f64 {
    match (four_year.macro_bias, direction) {
        (MacroBias::Bullish, Direction::Long) | (MacroBias::Bearish, Direction::Short) => 5.0,
        (MacroBias::Bullish, Direction::Short) | (MacroBias::Bearish, Direction::Long) => -5.0,
        (MacroBias::Neutral, _) => 0.0,
    }
}

/// Maps a regime's trend axis onto a direction for the cross-regime
/// disagreement check; `None` for a sideways/neutral trend since it takes no side.
fn regime_direction(regime: &MarketRegime) -> Option<Direction> {
    use market_regime_detector::TrendLabel;
    match regime.trend {
        TrendLabel::Up | TrendLabel::StrongUp => Some(Direction::Long),
        TrendLabel::Down | TrendLabel::StrongDown => Some(Direction::Short),
        TrendLabel::Sideways => None,
    }
}

/// Determines the HTF trend from 4h/1d swing structures and checks it against
/// `direction`. Returns the gate verdict and the score adjustment to fold in.
fn resolve_timeframe_conflicts(inputs: &FactorInputs, direction: Direction) -> (Verdict, f64) {
    let h4 = inputs.mtf_swings.get(&Timeframe::H4);
    let d1 = inputs.mtf_swings.get(&Timeframe::D1);

    let htf_trend = match (h4, d1) {
        (Some(a), Some(b)) if a == b => Some(*a),
        _ => None,
    };

    let Some(htf_trend) = htf_trend else {
        return (Verdict::Allowed, 0.0);
    };

    let aligned = matches!(
        (htf_trend, direction),
        (SwingTrend::Bullish, Direction::Long) | (SwingTrend::Bearish, Direction::Short)
    );
    let opposed = matches!(
        (htf_trend, direction),
        (SwingTrend::Bullish, Direction::Short) | (SwingTrend::Bearish, Direction::Long)
    );

    if aligned {
        let adjustment = 10.0 + (inputs.global_regime.trend_score / 100.0) * 10.0;
        return (Verdict::Allowed, adjustment.clamp(10.0, 20.0));
    }

    if opposed {
        if let Some(proximity) = inputs.htf_proximity {
            if proximity.valid && proximity.proximity_atr < 0.5 {
                let adjustment = (-10.0 - (0.5 - proximity.proximity_atr) * 80.0).clamp(-50.0, -10.0);
                return (Verdict::Caution, adjustment);
            }
        }
        return (Verdict::Blocked, -40.0);
    }

    (Verdict::Allowed, 0.0)
}

/// Sorts score traces highest-confluence first, applying the declared
/// tie-breaking chain: higher `htf_trend_alignment.raw`, then lower
/// volatility score, then alphabetical symbol.
pub fn rank(traces: &mut [ScoreTrace]) {
    traces.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap()
            .then_with(|| {
                let htf_a = a.factors.iter().find(|f| f.name == "htf_trend_alignment").map(|f| f.raw).unwrap_or(0.0);
                let htf_b = b.factors.iter().find(|f| f.name == "htf_trend_alignment").map(|f| f.raw).unwrap_or(0.0);
                htf_b.partial_cmp(&htf_a).unwrap()
            })
            .then_with(|| a.volatility_score.partial_cmp(&b.volatility_score).unwrap())
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cycle_detector::{Alignment, CycleLow, CycleState, CycleStatus, CycleType, Translation};
    use market_regime_detector::{LiquidityLabel, RiskAppetiteLabel, TrendLabel, VolatilityLabel};

    fn neutral_regime() -> MarketRegime {
        MarketRegime {
            trend: TrendLabel::Sideways,
            trend_score: 50.0,
            volatility: VolatilityLabel::Normal,
            volatility_score: 75.0,
            liquidity: LiquidityLabel::Healthy,
            liquidity_score: 75.0,
            risk_appetite: RiskAppetiteLabel::Balanced,
            risk_appetite_score: 60.0,
            derivatives_score: 60.0,
            composite: "sideways_normal".into(),
            score: 60.0,
        }
    }

    fn neutral_cycle_state(cycle_type: CycleType) -> CycleState {
        CycleState {
            cycle_type,
            bars_since_low: 10,
            expected_min: 18,
            expected_max: 28,
            cycle_low: CycleLow { price: 100.0, bar_index: 0, timestamp: Utc::now() },
            cycle_high_price: Some(110.0),
            peak_bar: Some(5),
            translation: Translation::Mtr,
            translation_pct: 50.0,
            is_failed: false,
            is_in_window: true,
            status: CycleStatus::Caution,
            bias: CycleBias::Neutral,
        }
    }

    fn sample_inputs() -> (IndicatorSet, Vec<OrderBlock>, Vec<FairValueGap>, Vec<LiquiditySweep>, Vec<BosChoch>, SwingStructure, HashMap<Timeframe, SwingTrend>, MarketRegime, MarketRegime, SymbolCycles, FourYearCycleContext) {
        let indicators = IndicatorSet {
            atr: Some(1.0),
            atr_series: vec![1.0; 5],
            bb_upper: Some(105.0),
            bb_middle: Some(100.0),
            bb_lower: Some(95.0),
            kc_upper: Some(106.0),
            kc_lower: Some(94.0),
            ttm_squeeze_on: false,
            ttm_squeeze_firing: false,
            rsi: Some(60.0),
            macd_histogram: Some(0.5),
        };
        let swing = SwingStructure { points: vec![], trend: SwingTrend::Neutral };
        let mut mtf = HashMap::new();
        mtf.insert(Timeframe::H4, SwingTrend::Neutral);
        mtf.insert(Timeframe::D1, SwingTrend::Neutral);
        let global = neutral_regime();
        let symbol = neutral_regime();
        let cycles = SymbolCycles {
            symbol: "BTC/USDT".into(),
            dcl: neutral_cycle_state(CycleType::Dcl),
            wcl: neutral_cycle_state(CycleType::Wcl),
            overall_bias: CycleBias::Neutral,
            alignment: Alignment::Mixed,
            warnings: vec![],
        };
        let four_year = FourYearCycleContext {
            days_since_low: 100,
            days_until_expected_low: 1200,
            cycle_position_pct: 10.0,
            phase: cycle_detector::FourYearPhase::Accumulation,
            phase_progress_pct: 40.0,
            last_low_date: chrono::NaiveDate::from_ymd_opt(2022, 11, 21).unwrap(),
            last_low_price: 15_500.0,
            last_low_event: "FTX collapse bottom",
            expected_next_low_date: chrono::NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            macro_bias: MacroBias::Bullish,
            confidence: 70.0,
            is_in_danger_zone: false,
            is_in_opportunity_zone: true,
        };
        (indicators, vec![], vec![], vec![], vec![], swing, mtf, global, symbol, cycles, four_year)
    }

    #[test]
    fn neutral_inputs_are_allowed_with_no_htf_adjustment() {
        let (indicators, obs, fvgs, sweeps, events, swing, mtf, global, symbol_regime, cycles, four_year) = sample_inputs();
        let inputs = FactorInputs {
            indicators: &indicators,
            order_blocks: &obs,
            fair_value_gaps: &fvgs,
            liquidity_sweeps: &sweeps,
            structure_events: &events,
            swing: &swing,
            mtf_swings: &mtf,
            global_regime: &global,
            symbol_regime: &symbol_regime,
            cycle: &cycles,
            four_year: &four_year,
            recent_volume_ratio: 1.0,
            htf_proximity: None,
        };
        let trace = score("BTC/USDT", Direction::Long, ModeProfile::StealthBalanced, &inputs);
        assert_eq!(trace.verdict, Verdict::Allowed);
        assert_eq!(trace.htf_adjustment, 0.0);
        assert!(trace.final_score > 0.0);
    }

    #[test]
    fn counter_htf_trend_without_proximity_is_blocked() {
        let (indicators, obs, fvgs, sweeps, events, swing, mut mtf, global, symbol_regime, cycles, four_year) = sample_inputs();
        mtf.insert(Timeframe::H4, SwingTrend::Bullish);
        mtf.insert(Timeframe::D1, SwingTrend::Bullish);
        let inputs = FactorInputs {
            indicators: &indicators,
            order_blocks: &obs,
            fair_value_gaps: &fvgs,
            liquidity_sweeps: &sweeps,
            structure_events: &events,
            swing: &swing,
            mtf_swings: &mtf,
            global_regime: &global,
            symbol_regime: &symbol_regime,
            cycle: &cycles,
            four_year: &four_year,
            recent_volume_ratio: 1.0,
            htf_proximity: None,
        };
        let trace = score("BTC/USDT", Direction::Short, ModeProfile::StealthBalanced, &inputs);
        assert_eq!(trace.verdict, Verdict::Blocked);
        assert_eq!(trace.final_score, 0.0);
    }

    #[test]
    fn counter_htf_trend_near_structure_is_caution_not_blocked() {
        let (indicators, obs, fvgs, sweeps, events, swing, mut mtf, global, symbol_regime, cycles, four_year) = sample_inputs();
        mtf.insert(Timeframe::H4, SwingTrend::Bullish);
        mtf.insert(Timeframe::D1, SwingTrend::Bullish);
        let inputs = FactorInputs {
            indicators: &indicators,
            order_blocks: &obs,
            fair_value_gaps: &fvgs,
            liquidity_sweeps: &sweeps,
            structure_events: &events,
            swing: &swing,
            mtf_swings: &mtf,
            global_regime: &global,
            symbol_regime: &symbol_regime,
            cycle: &cycles,
            four_year: &four_year,
            recent_volume_ratio: 1.0,
            htf_proximity: Some(HtfProximity { valid: true, proximity_atr: 0.2 }),
        };
        let trace = score("BTC/USDT", Direction::Short, ModeProfile::StealthBalanced, &inputs);
        assert_eq!(trace.verdict, Verdict::Caution);
        assert!(trace.final_score > 0.0);
    }

    #[test]
    fn rank_orders_by_score_then_tie_break_chain() {
        let (indicators, obs, fvgs, sweeps, events, swing, mtf, global, symbol_regime, cycles, four_year) = sample_inputs();
        let inputs = FactorInputs {
            indicators: &indicators,
            order_blocks: &obs,
            fair_value_gaps: &fvgs,
            liquidity_sweeps: &sweeps,
            structure_events: &events,
            swing: &swing,
            mtf_swings: &mtf,
            global_regime: &global,
            symbol_regime: &symbol_regime,
            cycle: &cycles,
            four_year: &four_year,
            recent_volume_ratio: 1.0,
            htf_proximity: None,
        };
        let mut traces = vec![
            score("ZZZ/USDT", Direction::Long, ModeProfile::StealthBalanced, &inputs),
            score("AAA/USDT", Direction::Long, ModeProfile::StealthBalanced, &inputs),
        ];
        rank(&mut traces);
        assert_eq!(traces[0].symbol, "AAA/USDT");
    }
}
