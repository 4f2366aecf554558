//! Date-driven 4-year cycle overlay (§4.5). Unlike DCL/WCL this never looks at
//! price: it places `as_of` between a compiled list of historical cycle lows
//! and a projected next low, and reads off a phase.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FourYearPhase {
    Accumulation,
    Markup,
    Distribution,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroBias {
    Bullish,
    Neutral,
    Bearish,
}

#[derive(Debug, Clone)]
pub struct HistoricalLow {
    pub date: NaiveDate,
    pub price: f64,
    pub event: &'static str,
}

/// Compiled-in 4-year-cycle low anchors. The final entry is a forward
/// projection, not a confirmed low.
pub fn historical_lows() -> [HistoricalLow; 5] {
    [
        HistoricalLow { date: NaiveDate::from_ymd_opt(2011, 11, 1).unwrap(), price: 2.0, event: "2011 bear market bottom" },
        HistoricalLow { date: NaiveDate::from_ymd_opt(2015, 1, 14).unwrap(), price: 170.0, event: "Mt. Gox unwind bottom" },
        HistoricalLow { date: NaiveDate::from_ymd_opt(2018, 12, 15).unwrap(), price: 3_200.0, event: "2018 bear market bottom" },
        HistoricalLow { date: NaiveDate::from_ymd_opt(2022, 11, 21).unwrap(), price: 15_500.0, event: "FTX collapse bottom" },
        HistoricalLow { date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(), price: 0.0, event: "projected next 4-year cycle low" },
    ]
}

#[derive(Debug, Clone)]
pub struct FourYearCycleContext {
    pub days_since_low: i64,
    pub days_until_expected_low: i64,
    pub cycle_position_pct: f64,
    pub phase: FourYearPhase,
    pub phase_progress_pct: f64,
    pub last_low_date: NaiveDate,
    pub last_low_price: f64,
    pub last_low_event: &'static str,
    pub expected_next_low_date: NaiveDate,
    pub macro_bias: MacroBias,
    pub confidence: f64,
    pub is_in_danger_zone: bool,
    pub is_in_opportunity_zone: bool,
}

/// Places `as_of` within the 4-year cycle relative to the compiled anchor list.
pub fn four_year_cycle_context(as_of: DateTime<Utc>) -> FourYearCycleContext {
    let today = as_of.date_naive();
    let anchors = historical_lows();

    let last_idx = anchors.iter().rposition(|a| a.date <= today).unwrap_or(0);
    let last = &anchors[last_idx];
    let next = anchors.get(last_idx + 1).unwrap_or(last);

    let days_since_low = (today - last.date).num_days().max(0);
    let total_span = (next.date - last.date).num_days().max(1);
    let days_until_expected_low = (total_span - days_since_low).max(0);

    let cycle_position_pct = (days_since_low as f64 / total_span as f64 * 100.0).clamp(0.0, 100.0);

    let quarter = ((cycle_position_pct / 25.0).floor() as i64).clamp(0, 3);
    let phase = match quarter {
        0 => FourYearPhase::Accumulation,
        1 => FourYearPhase::Markup,
        2 => FourYearPhase::Distribution,
        _ => FourYearPhase::Markdown,
    };
    let phase_progress_pct = cycle_position_pct - quarter as f64 * 25.0;
    let phase_progress_pct = (phase_progress_pct / 25.0 * 100.0).clamp(0.0, 100.0);

    let macro_bias = match phase {
        FourYearPhase::Accumulation | FourYearPhase::Markup => MacroBias::Bullish,
        FourYearPhase::Distribution | FourYearPhase::Markdown => MacroBias::Bearish,
    };

    let confidence = (100.0 - (phase_progress_pct - 50.0).abs()).clamp(50.0, 100.0);

    let is_in_opportunity_zone = phase == FourYearPhase::Accumulation
        || (phase == FourYearPhase::Markup && phase_progress_pct < 25.0);
    let is_in_danger_zone = (phase == FourYearPhase::Distribution && phase_progress_pct >= 75.0)
        || phase == FourYearPhase::Markdown;

    FourYearCycleContext {
        days_since_low,
        days_until_expected_low,
        cycle_position_pct,
        phase,
        phase_progress_pct,
        last_low_date: last.date,
        last_low_price: last.price,
        last_low_event: last.event,
        expected_next_low_date: next.date,
        macro_bias,
        confidence,
        is_in_danger_zone,
        is_in_opportunity_zone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn early_post_ftx_low_is_accumulation_and_bullish() {
        let as_of = Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap();
        let ctx = four_year_cycle_context(as_of);
        assert_eq!(ctx.phase, FourYearPhase::Accumulation);
        assert_eq!(ctx.macro_bias, MacroBias::Bullish);
        assert!(ctx.is_in_opportunity_zone);
    }

    #[test]
    fn late_in_the_cycle_is_markdown_and_bearish() {
        let as_of = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let ctx = four_year_cycle_context(as_of);
        assert_eq!(ctx.phase, FourYearPhase::Markdown);
        assert_eq!(ctx.macro_bias, MacroBias::Bearish);
        assert!(ctx.is_in_danger_zone);
    }
}
