use market_types::{Bar, ScanError};

use crate::traits::SmcPatternEngine;
use crate::types::{BosChoch, FairValueGap, LiquiditySweep, OrderBlock, PatternDirection, PatternGrade, PriceZone, StructureEventKind};

const SWING_LOOKBACK: usize = 3;

/// Reference SMC pattern engine. Grades scale with the size of the move or gap
/// relative to the preceding local range: large relative moves grade A, modest ones C.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceSmcEngine;

fn grade_by_ratio(ratio: f64) -> PatternGrade {
    if ratio >= 2.0 {
        PatternGrade::A
    } else if ratio >= 1.0 {
        PatternGrade::B
    } else {
        PatternGrade::C
    }
}

impl SmcPatternEngine for ReferenceSmcEngine {
    fn detect_order_blocks(&self, bars: &[Bar]) -> Result<Vec<OrderBlock>, ScanError> {
        if bars.len() < 3 {
            return Ok(vec![]);
        }

        let mut blocks = Vec::new();
        for i in 1..bars.len() - 1 {
            let candle = &bars[i];
            let next = &bars[i + 1];
            let candle_bullish = candle.close >= candle.open;
            let move_size = (next.close - candle.close).abs();
            let candle_range = (candle.high - candle.low).max(1e-9);
            let ratio = move_size / candle_range;

            // An order block is the last opposite-direction candle before a strong
            // directional continuation: a down candle followed by a strong rally, or vice versa.
            if !candle_bullish && next.close > candle.high {
                blocks.push(OrderBlock {
                    direction: PatternDirection::Bullish,
                    zone: PriceZone { low: candle.low, high: candle.open.max(candle.close) },
                    anchor_index: i,
                    grade: grade_by_ratio(ratio),
                    mitigated: bars[i + 1..].iter().any(|b| b.low <= candle.open.max(candle.close)),
                });
            } else if candle_bullish && next.close < candle.low {
                blocks.push(OrderBlock {
                    direction: PatternDirection::Bearish,
                    zone: PriceZone { low: candle.open.min(candle.close), high: candle.high },
                    anchor_index: i,
                    grade: grade_by_ratio(ratio),
                    mitigated: bars[i + 1..].iter().any(|b| b.high >= candle.open.min(candle.close)),
                });
            }
        }

        Ok(blocks)
    }

    fn detect_fvgs(&self, bars: &[Bar]) -> Result<Vec<FairValueGap>, ScanError> {
        if bars.len() < 3 {
            return Ok(vec![]);
        }

        let mut gaps = Vec::new();
        for i in 0..bars.len() - 2 {
            let left = &bars[i];
            let middle = &bars[i + 1];
            let right = &bars[i + 2];
            let middle_range = (middle.high - middle.low).max(1e-9);

            if right.low > left.high {
                let gap_size = right.low - left.high;
                gaps.push(FairValueGap {
                    direction: PatternDirection::Bullish,
                    zone: PriceZone { low: left.high, high: right.low },
                    anchor_index: i + 1,
                    grade: grade_by_ratio(gap_size / middle_range),
                    mitigated: bars[i + 3..].iter().any(|b| b.low <= left.high),
                });
            } else if right.high < left.low {
                let gap_size = left.low - right.high;
                gaps.push(FairValueGap {
                    direction: PatternDirection::Bearish,
                    zone: PriceZone { low: right.high, high: left.low },
                    anchor_index: i + 1,
                    grade: grade_by_ratio(gap_size / middle_range),
                    mitigated: bars[i + 3..].iter().any(|b| b.high >= left.low),
                });
            }
        }

        Ok(gaps)
    }

    fn detect_liquidity_sweeps(&self, bars: &[Bar]) -> Result<Vec<LiquiditySweep>, ScanError> {
        if bars.len() < SWING_LOOKBACK * 2 + 2 {
            return Ok(vec![]);
        }

        let mut sweeps = Vec::new();
        for i in SWING_LOOKBACK..bars.len() - 1 {
            let window = &bars[i - SWING_LOOKBACK..i];
            let prior_high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let prior_low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let bar = &bars[i];
            let range = (bar.high - bar.low).max(1e-9);

            if bar.high > prior_high && bar.close < prior_high {
                sweeps.push(LiquiditySweep {
                    direction: PatternDirection::Bearish,
                    level: prior_high,
                    anchor_index: i,
                    grade: grade_by_ratio((bar.high - prior_high) / range),
                });
            } else if bar.low < prior_low && bar.close > prior_low {
                sweeps.push(LiquiditySweep {
                    direction: PatternDirection::Bullish,
                    level: prior_low,
                    anchor_index: i,
                    grade: grade_by_ratio((prior_low - bar.low) / range),
                });
            }
        }

        Ok(sweeps)
    }

    fn detect_bos_choch(&self, bars: &[Bar]) -> Result<Vec<BosChoch>, ScanError> {
        if bars.len() < SWING_LOOKBACK * 2 + 2 {
            return Ok(vec![]);
        }

        let mut events = Vec::new();
        let mut trend_up: Option<bool> = None;

        for i in SWING_LOOKBACK..bars.len() {
            let window = &bars[i - SWING_LOOKBACK..i];
            let prior_high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let prior_low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let bar = &bars[i];
            let range = (bar.high - bar.low).max(1e-9);

            if bar.close > prior_high {
                let kind = match trend_up {
                    Some(false) => StructureEventKind::Choch,
                    _ => StructureEventKind::Bos,
                };
                events.push(BosChoch {
                    kind,
                    direction: PatternDirection::Bullish,
                    anchor_index: i,
                    grade: grade_by_ratio((bar.close - prior_high) / range),
                });
                trend_up = Some(true);
            } else if bar.close < prior_low {
                let kind = match trend_up {
                    Some(true) => StructureEventKind::Choch,
                    _ => StructureEventKind::Bos,
                };
                events.push(BosChoch {
                    kind,
                    direction: PatternDirection::Bearish,
                    anchor_index: i,
                    grade: grade_by_ratio((prior_low - bar.close) / range),
                });
                trend_up = Some(false);
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(ts: i64, o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar { timestamp: Utc.timestamp_opt(ts, 0).unwrap(), open: o, high: h, low: l, close: c, volume: 1000.0 }
    }

    #[test]
    fn detects_a_bullish_fair_value_gap() {
        let bars = vec![
            bar(0, 100.0, 101.0, 99.0, 100.5),
            bar(3600, 100.5, 103.0, 100.2, 102.8),
            bar(7200, 102.9, 105.0, 102.5, 104.0),
        ];
        let engine = ReferenceSmcEngine;
        let gaps = engine.detect_fvgs(&bars).unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].direction, PatternDirection::Bullish);
    }

    #[test]
    fn short_history_yields_no_patterns() {
        let bars = vec![bar(0, 100.0, 101.0, 99.0, 100.5)];
        let engine = ReferenceSmcEngine;
        assert!(engine.detect_order_blocks(&bars).unwrap().is_empty());
        assert!(engine.detect_fvgs(&bars).unwrap().is_empty());
        assert!(engine.detect_liquidity_sweeps(&bars).unwrap().is_empty());
        assert!(engine.detect_bos_choch(&bars).unwrap().is_empty());
    }
}
