//! Five-dimension composite market regime (§4.4): trend, volatility, liquidity,
//! risk appetite, and a derivatives placeholder, combined into a weighted score
//! and a hysteresis-gated composite label.

pub mod dominance;

use std::collections::VecDeque;
use std::time::Duration;

use indicator_contract::indicators::{adx, atr, sma};
use market_types::{Bar, ModeProfile, ScanError};
use serde::{Deserialize, Serialize};
use swing_structure::{compute_swing_structure, Trend as SwingTrend};
use unified_cache::UnifiedCache;

pub use dominance::DominanceSnapshot;

const HISTORY_CAP: usize = 20;
const HYSTERESIS_N: usize = 3;
const DERIVATIVES_SCORE: f64 = 60.0;
const GLOBAL_REGIME_TTL: Duration = Duration::from_secs(300);
const SYMBOL_REGIME_TTL: Duration = Duration::from_secs(60);
const GLOBAL_REGIME_CACHE_KEY: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendLabel {
    StrongUp,
    Up,
    Sideways,
    Down,
    StrongDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityLabel {
    Compressed,
    Normal,
    Elevated,
    Volatile,
    Chaotic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityLabel {
    Thin,
    Healthy,
    Heavy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskAppetiteLabel {
    ExtremeRiskOff,
    RiskOff,
    Cautious,
    BtcFlight,
    BtcDominant,
    Balanced,
    RiskOn,
    AltSeason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegime {
    pub trend: TrendLabel,
    pub trend_score: f64,
    pub volatility: VolatilityLabel,
    pub volatility_score: f64,
    pub liquidity: LiquidityLabel,
    pub liquidity_score: f64,
    pub risk_appetite: RiskAppetiteLabel,
    pub risk_appetite_score: f64,
    pub derivatives_score: f64,
    pub composite: String,
    pub score: f64,
}

/// Global dominance inputs feeding the risk-appetite axis. `None` means the
/// source failed to return data; the axis degrades to `balanced(50)` rather
/// than guessing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DominanceInputs {
    pub btc_dominance_pct: Option<f64>,
    pub stablecoin_dominance_pct: Option<f64>,
}

/// Hint from the cycle detector about whether a symbol currently sits in a
/// cycle-low accumulation zone or a cycle-high distribution zone. Passed in
/// rather than depending on the cycle-detector crate directly, since regime
/// detection runs upstream of cycle detection in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleZoneHint {
    Accumulation,
    Distribution,
    Neither,
}

/// Holds hysteresis state across scan passes. One instance per detector scope
/// (one global, one per symbol).
pub struct RegimeDetector {
    history: VecDeque<String>,
    pending: Option<(String, usize)>,
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RegimeDetector {
    pub fn new() -> Self {
        Self { history: VecDeque::with_capacity(HISTORY_CAP), pending: None }
    }

    /// Computes the regime for `bars` (the highest available timeframe from the
    /// caller's preference list) and applies hysteresis against prior calls.
    pub fn compute(
        &mut self,
        bars: &[Bar],
        mode: ModeProfile,
        dominance: DominanceInputs,
    ) -> Result<MarketRegime, ScanError> {
        let (trend, trend_score) = classify_trend(bars, mode)?;
        let (volatility, volatility_score) = classify_volatility(bars)?;
        let (liquidity, liquidity_score) = classify_liquidity(bars);
        let (risk_appetite, risk_appetite_score) = classify_risk_appetite(dominance);

        let candidate_composite = composite_label(trend, volatility, risk_appetite);
        let accepted_composite = self.apply_hysteresis(candidate_composite);

        let score = trend_score * 0.30
            + volatility_score * 0.20
            + liquidity_score * 0.20
            + risk_appetite_score * 0.20
            + DERIVATIVES_SCORE * 0.10;

        Ok(MarketRegime {
            trend,
            trend_score,
            volatility,
            volatility_score,
            liquidity,
            liquidity_score,
            risk_appetite,
            risk_appetite_score,
            derivatives_score: DERIVATIVES_SCORE,
            composite: accepted_composite,
            score,
        })
    }

    /// Applies a cycle-aware override to an already-computed regime's trend axis
    /// (§4.4 per-symbol overrides): a downtrend at a cycle accumulation low, or
    /// an uptrend at a cycle distribution high, is reclassified `sideways` with
    /// a score bonus rather than left to reject a valid mean-reversion setup.
    pub fn apply_cycle_override(regime: &mut MarketRegime, hint: CycleZoneHint) {
        match (regime.trend, hint) {
            (TrendLabel::Down | TrendLabel::StrongDown, CycleZoneHint::Accumulation) => {
                regime.trend = TrendLabel::Sideways;
                regime.trend_score = (regime.trend_score + 10.0).min(100.0);
            }
            (TrendLabel::Up | TrendLabel::StrongUp, CycleZoneHint::Distribution) => {
                regime.trend = TrendLabel::Sideways;
                regime.trend_score = (regime.trend_score + 10.0).min(100.0);
            }
            _ => {}
        }
    }

    fn apply_hysteresis(&mut self, candidate: String) -> String {
        let accepted = self.history.back().cloned();

        let Some(accepted) = accepted else {
            self.push(candidate.clone());
            return candidate;
        };

        if candidate == accepted {
            self.pending = None;
            self.push(accepted.clone());
            return accepted;
        }

        if self.history.len() < HYSTERESIS_N {
            self.pending = None;
            self.push(candidate.clone());
            return candidate;
        }

        let stable = self.history.iter().rev().take(HYSTERESIS_N).all(|c| *c == accepted);
        if !stable {
            self.pending = None;
            self.push(candidate.clone());
            return candidate;
        }

        match &mut self.pending {
            Some((pending_candidate, count)) if *pending_candidate == candidate => {
                *count += 1;
                if *count >= HYSTERESIS_N {
                    self.pending = None;
                    self.push(candidate.clone());
                    return candidate;
                }
            }
            _ => {
                self.pending = Some((candidate.clone(), 1));
            }
        }

        tracing::debug!(candidate = %candidate, accepted = %accepted, "regime flip held back by hysteresis");
        self.push(accepted.clone());
        accepted
    }

    fn push(&mut self, composite: String) {
        if self.history.len() == HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(composite);
    }
}

/// Computes (or returns the cached) global regime, reusing the 300s TTL cache
/// entry when a fresh computation isn't needed. `detector` carries the hysteresis
/// history across scan passes and is the caller's responsibility to persist.
pub fn global_regime_cached(
    detector: &mut RegimeDetector,
    cache: &UnifiedCache,
    bars: &[Bar],
    mode: ModeProfile,
    dominance: DominanceInputs,
) -> Result<MarketRegime, ScanError> {
    if let Some(cached) = cache.get_regime::<MarketRegime>(GLOBAL_REGIME_CACHE_KEY) {
        return Ok(cached);
    }
    let regime = detector.compute(bars, mode, dominance)?;
    cache.set_regime(GLOBAL_REGIME_CACHE_KEY, &regime, Some(GLOBAL_REGIME_TTL));
    Ok(regime)
}

/// Computes (or returns the cached) per-symbol regime with the cycle-aware
/// override applied, using a 60s TTL cache entry keyed by symbol.
pub fn symbol_regime_cached(
    detector: &mut RegimeDetector,
    cache: &UnifiedCache,
    symbol: &str,
    bars: &[Bar],
    mode: ModeProfile,
    dominance: DominanceInputs,
    cycle_hint: CycleZoneHint,
) -> Result<MarketRegime, ScanError> {
    if let Some(cached) = cache.get_regime::<MarketRegime>(symbol) {
        return Ok(cached);
    }
    let mut regime = detector.compute(bars, mode, dominance)?;
    RegimeDetector::apply_cycle_override(&mut regime, cycle_hint);
    cache.set_regime(symbol, &regime, Some(SYMBOL_REGIME_TTL));
    Ok(regime)
}

/// Highest-to-lowest timeframe preference for the trend axis (§4.4). Callers
/// holding an `MtfBundle` should walk this list and feed the first timeframe
/// with enough bars into [`RegimeDetector::compute`].
pub const TREND_TF_PREFERENCE: [market_types::Timeframe; 6] = [
    market_types::Timeframe::W1,
    market_types::Timeframe::D1,
    market_types::Timeframe::H4,
    market_types::Timeframe::H1,
    market_types::Timeframe::M30,
    market_types::Timeframe::M15,
];

fn classify_trend(bars: &[Bar], mode: ModeProfile) -> Result<(TrendLabel, f64), ScanError> {
    let lookback = (bars.len() / 4).clamp(30, 80);
    if bars.len() < lookback * 2 + 1 + 14 {
        return Err(ScanError::InsufficientData(format!(
            "trend classification needs at least {} bars, got {}",
            lookback * 2 + 1 + 14,
            bars.len()
        )));
    }

    let structure = compute_swing_structure(bars, lookback, 0.5)?;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ma20 = sma(&closes, 20);
    let atr14 = atr(bars, 14);
    let adx14 = adx(bars, 14).adx;

    let price = bars.last().unwrap().close;
    let atr_pct = atr14.last().map(|v| v / price * 100.0).unwrap_or(0.0);
    let normalized_slope = if ma20.len() >= 2 && atr_pct > 0.0 {
        (ma20[ma20.len() - 1] - ma20[ma20.len() - 2]) / atr_pct
    } else {
        0.0
    };
    let current_adx = adx14.last().copied().unwrap_or(0.0);
    let (min_adx, strong_adx, strong_slope) = mode.trend_thresholds();

    let label = if current_adx < min_adx {
        TrendLabel::Sideways
    } else {
        match structure.trend {
            SwingTrend::Bullish => {
                if current_adx > strong_adx && normalized_slope > strong_slope {
                    TrendLabel::StrongUp
                } else {
                    TrendLabel::Up
                }
            }
            SwingTrend::Bearish => {
                if current_adx > strong_adx && normalized_slope < -strong_slope {
                    TrendLabel::StrongDown
                } else {
                    TrendLabel::Down
                }
            }
            SwingTrend::Neutral => TrendLabel::Sideways,
        }
    };

    let score = match label {
        TrendLabel::StrongUp => 90.0,
        TrendLabel::Up => 70.0,
        TrendLabel::Sideways => 50.0,
        TrendLabel::Down => 30.0,
        TrendLabel::StrongDown => 10.0,
    };

    Ok((label, score))
}

fn classify_volatility(bars: &[Bar]) -> Result<(VolatilityLabel, f64), ScanError> {
    let atr_series = atr(bars, 14);
    let Some(&current_atr) = atr_series.last() else {
        return Err(ScanError::InsufficientData("not enough bars to compute ATR for volatility axis".into()));
    };
    let price = bars.last().unwrap().close;
    let atr_pct = current_atr / price * 100.0;

    let label = if atr_pct < 0.8 {
        VolatilityLabel::Compressed
    } else if atr_pct < 1.5 {
        VolatilityLabel::Normal
    } else if atr_pct < 2.5 {
        VolatilityLabel::Elevated
    } else if atr_pct < 4.0 {
        VolatilityLabel::Volatile
    } else {
        VolatilityLabel::Chaotic
    };

    let score = match label {
        VolatilityLabel::Compressed => 60.0,
        VolatilityLabel::Normal => 75.0,
        VolatilityLabel::Elevated => {
            if atr_series.len() >= 10 {
                let recent5: f64 = atr_series[atr_series.len() - 5..].iter().sum::<f64>() / 5.0;
                let prior5: f64 = atr_series[atr_series.len() - 10..atr_series.len() - 5].iter().sum::<f64>() / 5.0;
                if prior5 > 0.0 && recent5 / prior5 > 1.15 { 55.0 } else { 60.0 }
            } else {
                60.0
            }
        }
        VolatilityLabel::Volatile => 40.0,
        VolatilityLabel::Chaotic => 20.0,
    };

    Ok((label, score))
}

fn classify_liquidity(bars: &[Bar]) -> (LiquidityLabel, f64) {
    if bars.len() < 20 {
        return (LiquidityLabel::Thin, 40.0);
    }
    let recent5: f64 = bars[bars.len() - 5..].iter().map(|b| b.volume).sum::<f64>() / 5.0;
    let recent20: f64 = bars[bars.len() - 20..].iter().map(|b| b.volume).sum::<f64>() / 20.0;
    let ratio = if recent20 > 0.0 { recent5 / recent20 } else { 0.0 };

    if ratio < 0.5 {
        (LiquidityLabel::Thin, 40.0)
    } else if ratio < 1.5 {
        (LiquidityLabel::Healthy, 75.0)
    } else {
        (LiquidityLabel::Heavy, 65.0)
    }
}

fn classify_risk_appetite(dominance: DominanceInputs) -> (RiskAppetiteLabel, f64) {
    let (btc, stable) = match (dominance.btc_dominance_pct, dominance.stablecoin_dominance_pct) {
        (Some(b), Some(s)) => (b, s),
        _ => return (RiskAppetiteLabel::Balanced, 50.0),
    };

    if stable > 12.0 {
        return (RiskAppetiteLabel::ExtremeRiskOff, 15.0);
    }
    if stable > 9.0 {
        return (RiskAppetiteLabel::RiskOff, 30.0);
    }
    if stable > 7.5 {
        return (RiskAppetiteLabel::Cautious, 45.0);
    }
    if btc > 60.0 {
        return (RiskAppetiteLabel::BtcFlight, 40.0);
    }
    if btc > 55.0 {
        return (RiskAppetiteLabel::BtcDominant, 50.0);
    }
    if btc < 48.0 {
        return (RiskAppetiteLabel::AltSeason, 85.0);
    }
    if btc < 52.0 {
        return (RiskAppetiteLabel::RiskOn, 75.0);
    }
    if stable < 5.0 {
        return (RiskAppetiteLabel::RiskOn, 80.0);
    }
    (RiskAppetiteLabel::Balanced, 60.0)
}

fn composite_label(trend: TrendLabel, volatility: VolatilityLabel, risk_appetite: RiskAppetiteLabel) -> String {
    let bullish = matches!(trend, TrendLabel::Up | TrendLabel::StrongUp);
    let bearish = matches!(trend, TrendLabel::Down | TrendLabel::StrongDown);
    let risk_off = matches!(risk_appetite, RiskAppetiteLabel::RiskOff | RiskAppetiteLabel::ExtremeRiskOff);
    let risk_on = matches!(risk_appetite, RiskAppetiteLabel::RiskOn | RiskAppetiteLabel::AltSeason);

    if volatility == VolatilityLabel::Chaotic {
        return "chaotic_volatile".to_string();
    }
    if trend == TrendLabel::Sideways && risk_off {
        return "choppy_risk_off".to_string();
    }
    if bullish && risk_on {
        return "bullish_risk_on".to_string();
    }
    if bearish && risk_off {
        return "bearish_risk_off".to_string();
    }
    if trend == TrendLabel::Sideways && volatility == VolatilityLabel::Compressed {
        return "range_coiling".to_string();
    }

    format!("{}_{}", trend_word(trend), volatility_word(volatility))
}

fn trend_word(trend: TrendLabel) -> &'static str {
    match trend {
        TrendLabel::StrongUp => "strong_up",
        TrendLabel::Up => "up",
        TrendLabel::Sideways => "sideways",
        TrendLabel::Down => "down",
        TrendLabel::StrongDown => "strong_down",
    }
}

fn volatility_word(volatility: VolatilityLabel) -> &'static str {
    match volatility {
        VolatilityLabel::Compressed => "compressed",
        VolatilityLabel::Normal => "normal",
        VolatilityLabel::Elevated => "elevated",
        VolatilityLabel::Volatile => "volatile",
        VolatilityLabel::Chaotic => "chaotic",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn trending_bars(n: usize, drift: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * drift;
                Bar {
                    timestamp: Utc.timestamp_opt(i as i64 * 3600, 0).unwrap(),
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base + drift * 0.5,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    #[test]
    fn risk_appetite_degrades_on_missing_dominance_sources() {
        let (label, score) = classify_risk_appetite(DominanceInputs::default());
        assert_eq!(label, RiskAppetiteLabel::Balanced);
        assert_eq!(score, 50.0);
    }

    #[test]
    fn risk_appetite_extreme_risk_off_takes_priority() {
        let (label, _) = classify_risk_appetite(DominanceInputs {
            btc_dominance_pct: Some(40.0),
            stablecoin_dominance_pct: Some(13.0),
        });
        assert_eq!(label, RiskAppetiteLabel::ExtremeRiskOff);
    }

    #[test]
    fn hysteresis_accepts_first_three_readings_freely() {
        let mut detector = RegimeDetector::new();
        assert_eq!(detector.apply_hysteresis("a".into()), "a");
        assert_eq!(detector.apply_hysteresis("b".into()), "b");
    }

    #[test]
    fn hysteresis_holds_back_a_single_flip_from_a_stable_regime() {
        let mut detector = RegimeDetector::new();
        for _ in 0..5 {
            detector.apply_hysteresis("stable".into());
        }
        let result = detector.apply_hysteresis("flip".into());
        assert_eq!(result, "stable");
    }

    #[test]
    fn hysteresis_eventually_accepts_a_confirmed_flip() {
        let mut detector = RegimeDetector::new();
        for _ in 0..5 {
            detector.apply_hysteresis("stable".into());
        }
        detector.apply_hysteresis("flip".into());
        detector.apply_hysteresis("flip".into());
        let result = detector.apply_hysteresis("flip".into());
        assert_eq!(result, "flip");
    }

    #[test]
    fn cycle_override_flattens_downtrend_in_accumulation_zone() {
        let mut regime = MarketRegime {
            trend: TrendLabel::Down,
            trend_score: 30.0,
            volatility: VolatilityLabel::Normal,
            volatility_score: 75.0,
            liquidity: LiquidityLabel::Healthy,
            liquidity_score: 75.0,
            risk_appetite: RiskAppetiteLabel::Balanced,
            risk_appetite_score: 60.0,
            derivatives_score: 60.0,
            composite: "down_normal".into(),
            score: 0.0,
        };
        RegimeDetector::apply_cycle_override(&mut regime, CycleZoneHint::Accumulation);
        assert_eq!(regime.trend, TrendLabel::Sideways);
        assert_eq!(regime.trend_score, 40.0);
    }

    #[test]
    fn classify_volatility_rejects_insufficient_bars() {
        let bars = trending_bars(5, 0.1);
        assert!(matches!(classify_volatility(&bars), Err(ScanError::InsufficientData(_))));
    }
}
