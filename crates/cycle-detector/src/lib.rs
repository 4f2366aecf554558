//! Per-symbol Daily/Weekly cycle-low translation detector (§4.5). Translation
//! (where within the cycle the peak fell) is the primary signal; a cycle
//! breaking its own low is a "failed" cycle regardless of translation.

pub mod four_year_cycle;

use chrono::{DateTime, Utc};
use market_types::{Bar, ScanError};
use serde::{Deserialize, Serialize};

pub use four_year_cycle::{four_year_cycle_context, FourYearCycleContext, FourYearPhase, MacroBias};

const DCL_WINDOW: (usize, usize) = (18, 28);
const WCL_WINDOW: (usize, usize) = (35, 50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleType {
    Dcl,
    Wcl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Translation {
    Rtr,
    Mtr,
    Ltr,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleStatus {
    Healthy,
    Caution,
    Warning,
    Failed,
    Early,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleBias {
    Long,
    Short,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    Aligned,
    Mixed,
    Conflicting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleLow {
    pub price: f64,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleState {
    pub cycle_type: CycleType,
    pub bars_since_low: usize,
    pub expected_min: usize,
    pub expected_max: usize,
    pub cycle_low: CycleLow,
    pub cycle_high_price: Option<f64>,
    pub peak_bar: Option<usize>,
    pub translation: Translation,
    pub translation_pct: f64,
    pub is_failed: bool,
    pub is_in_window: bool,
    pub status: CycleStatus,
    pub bias: CycleBias,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolCycles {
    pub symbol: String,
    pub dcl: CycleState,
    pub wcl: CycleState,
    pub overall_bias: CycleBias,
    pub alignment: Alignment,
    pub warnings: Vec<String>,
}

/// Detects a single cycle (DCL or WCL) from daily bars.
pub fn detect_cycle(bars: &[Bar], cycle_type: CycleType, expected_min: usize, expected_max: usize) -> Result<CycleState, ScanError> {
    if bars.len() < expected_max + 1 {
        return Err(ScanError::InsufficientData(format!(
            "cycle detection needs at least {} bars, got {}",
            expected_max + 1,
            bars.len()
        )));
    }

    let low_idx = find_cycle_low(bars, expected_max);
    let cycle_low = CycleLow { price: bars[low_idx].low, bar_index: low_idx, timestamp: bars[low_idx].timestamp };

    let bars_since_low = bars.len() - 1 - low_idx;
    let current_price = bars.last().unwrap().close;

    let (high_rel_idx, cycle_high_price) = bars[low_idx..]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.high.partial_cmp(&b.1.high).unwrap())
        .map(|(i, b)| (i, b.high))
        .unwrap();
    let peak_bar = high_rel_idx;

    let translation_pct = if bars_since_low > 0 { 100.0 * peak_bar as f64 / bars_since_low as f64 } else { 0.0 };
    let translation = if bars_since_low == 0 {
        Translation::Unknown
    } else if translation_pct > 55.0 {
        Translation::Rtr
    } else if translation_pct < 45.0 {
        Translation::Ltr
    } else {
        Translation::Mtr
    };

    let is_failed = current_price < cycle_low.price;
    let is_in_window = bars_since_low >= expected_min && bars_since_low <= expected_max;

    let status = if is_failed {
        CycleStatus::Failed
    } else if translation == Translation::Ltr {
        CycleStatus::Warning
    } else if translation == Translation::Mtr && current_price < cycle_low.price * 1.02 {
        CycleStatus::Caution
    } else if translation == Translation::Rtr {
        CycleStatus::Healthy
    } else if (bars_since_low as f64) < 0.2 * expected_min as f64 {
        CycleStatus::Early
    } else {
        CycleStatus::Unknown
    };

    let bias = if translation == Translation::Rtr && !is_failed {
        CycleBias::Long
    } else if translation == Translation::Ltr || is_failed {
        CycleBias::Short
    } else {
        CycleBias::Neutral
    };

    Ok(CycleState {
        cycle_type,
        bars_since_low,
        expected_min,
        expected_max,
        cycle_low,
        cycle_high_price: Some(cycle_high_price),
        peak_bar: Some(peak_bar),
        translation,
        translation_pct,
        is_failed,
        is_in_window,
        status,
        bias,
    })
}

/// Scans backwards within the last `expected_max` bars for the lowest low.
/// A fuller implementation would also require the candidate to be preceded by
/// a higher low or a transition out of a prior failed cycle; this approximates
/// that with a fixed backward window, matching the heuristic nature called
/// out for this detector.
fn find_cycle_low(bars: &[Bar], expected_max: usize) -> usize {
    let window_start = bars.len().saturating_sub(expected_max);
    let window = &bars[window_start..];
    let (rel_idx, _) = window
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.low.partial_cmp(&b.1.low).unwrap())
        .expect("window is non-empty");
    window_start + rel_idx
}

/// Detects DCL and WCL together and derives the aggregate bias/alignment.
pub fn detect_symbol_cycles(symbol: &str, daily_bars: &[Bar]) -> Result<SymbolCycles, ScanError> {
    let dcl = detect_cycle(daily_bars, CycleType::Dcl, DCL_WINDOW.0, DCL_WINDOW.1)?;
    let wcl = detect_cycle(daily_bars, CycleType::Wcl, WCL_WINDOW.0, WCL_WINDOW.1)?;

    let mut warnings = Vec::new();
    if dcl.status == CycleStatus::Failed {
        warnings.push(format!("{symbol}: DCL failed at {:.4}", dcl.cycle_low.price));
    }
    if wcl.status == CycleStatus::Failed {
        warnings.push(format!("{symbol}: WCL failed at {:.4}", wcl.cycle_low.price));
    }

    let alignment = if dcl.bias != CycleBias::Neutral && dcl.bias == wcl.bias {
        Alignment::Aligned
    } else if (dcl.bias == CycleBias::Long && wcl.bias == CycleBias::Short)
        || (dcl.bias == CycleBias::Short && wcl.bias == CycleBias::Long)
    {
        Alignment::Conflicting
    } else {
        Alignment::Mixed
    };

    let overall_bias = if alignment == Alignment::Aligned { dcl.bias } else { CycleBias::Neutral };

    Ok(SymbolCycles { symbol: symbol.to_string(), dcl, wcl, overall_bias, alignment, warnings })
}
