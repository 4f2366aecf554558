//! Alternating, labeled swing-point detection from a single timeframe's OHLCV (§4.3).

use chrono::{DateTime, Utc};
use indicator_contract::indicators::atr;
use market_types::{Bar, ScanError};
use serde::{Deserialize, Serialize};

const ATR_PERIOD: usize = 14;
const DEFAULT_MIN_SWING_ATR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingLabel {
    Hh,
    Hl,
    Lh,
    Ll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwingPoint {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub is_high: bool,
    pub strength: f64,
    pub label: SwingLabel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingStructure {
    pub points: Vec<SwingPoint>,
    pub trend: Trend,
}

impl SwingStructure {
    pub fn last_high(&self) -> Option<&SwingPoint> {
        self.points.iter().rev().find(|p| p.is_high)
    }

    pub fn last_low(&self) -> Option<&SwingPoint> {
        self.points.iter().rev().find(|p| !p.is_high)
    }
}

#[derive(Debug, Clone, Copy)]
struct RawSwing {
    index: usize,
    price: f64,
    timestamp: DateTime<Utc>,
    is_high: bool,
    strength: f64,
}

/// Computes labeled swing structure and its derived trend from one bar sequence.
/// `lookback` sets the symmetric window radius; `min_swing_atr` is the minimum
/// strength (in ATR multiples) a swing must clear to survive.
pub fn compute_swing_structure(bars: &[Bar], lookback: usize, min_swing_atr: f64) -> Result<SwingStructure, ScanError> {
    if lookback == 0 {
        return Err(ScanError::InvalidArgument("swing lookback must be >= 1".into()));
    }
    if bars.len() < lookback * 2 + 1 + ATR_PERIOD {
        return Err(ScanError::InsufficientData(format!(
            "need at least {} bars for swing structure with lookback {lookback}, got {}",
            lookback * 2 + 1 + ATR_PERIOD,
            bars.len()
        )));
    }

    let atr_series = atr(bars, ATR_PERIOD);
    let atr_at = |i: usize| -> Option<f64> {
        if i < ATR_PERIOD { None } else { atr_series.get(i - ATR_PERIOD).copied() }
    };

    let mut raw = Vec::new();
    for i in lookback..bars.len() - lookback {
        let Some(atr_i) = atr_at(i) else { continue };
        if atr_i <= 0.0 {
            continue;
        }
        let window = &bars[i - lookback..=i + lookback];

        let is_swing_high = window.iter().all(|b| b.high <= bars[i].high);
        let is_swing_low = window.iter().all(|b| b.low >= bars[i].low);

        if is_swing_high {
            let strength = (bars[i].high - bars[i].close).abs() / atr_i;
            raw.push(RawSwing { index: i, price: bars[i].high, timestamp: bars[i].timestamp, is_high: true, strength });
        }
        if is_swing_low {
            let strength = (bars[i].low - bars[i].close).abs() / atr_i;
            raw.push(RawSwing { index: i, price: bars[i].low, timestamp: bars[i].timestamp, is_high: false, strength });
        }
    }

    raw.sort_by_key(|s| s.index);
    let deduped = dedup_to_fixpoint(raw);

    let min_atr = if min_swing_atr > 0.0 { min_swing_atr } else { DEFAULT_MIN_SWING_ATR };
    let filtered: Vec<RawSwing> = deduped.into_iter().filter(|s| s.strength >= min_atr).collect();

    let points = label(&filtered);
    let trend = derive_trend(&points);

    Ok(SwingStructure { points, trend })
}

/// Repeatedly collapses consecutive same-type candidates (keeping the more extreme)
/// until the sequence strictly alternates high/low.
fn dedup_to_fixpoint(mut swings: Vec<RawSwing>) -> Vec<RawSwing> {
    loop {
        let mut changed = false;
        let mut next = Vec::with_capacity(swings.len());
        let mut i = 0;
        while i < swings.len() {
            if i + 1 < swings.len() && swings[i].is_high == swings[i + 1].is_high {
                let keep = if swings[i].is_high {
                    if swings[i].price >= swings[i + 1].price { swings[i] } else { swings[i + 1] }
                } else if swings[i].price <= swings[i + 1].price {
                    swings[i]
                } else {
                    swings[i + 1]
                };
                next.push(keep);
                i += 2;
                changed = true;
            } else {
                next.push(swings[i]);
                i += 1;
            }
        }
        swings = next;
        if !changed {
            return swings;
        }
    }
}

fn label(swings: &[RawSwing]) -> Vec<SwingPoint> {
    let mut points = Vec::with_capacity(swings.len());
    let mut prev_high: Option<f64> = None;
    let mut prev_low: Option<f64> = None;

    for s in swings {
        let lab = if s.is_high {
            let label = match prev_high {
                None => SwingLabel::Hh,
                Some(prev) if s.price > prev => SwingLabel::Hh,
                Some(_) => SwingLabel::Lh,
            };
            prev_high = Some(s.price);
            label
        } else {
            let label = match prev_low {
                None => SwingLabel::Hl,
                Some(prev) if s.price > prev => SwingLabel::Hl,
                Some(_) => SwingLabel::Ll,
            };
            prev_low = Some(s.price);
            label
        };

        points.push(SwingPoint { price: s.price, timestamp: s.timestamp, is_high: s.is_high, strength: s.strength, label: lab });
    }

    points
}

fn derive_trend(points: &[SwingPoint]) -> Trend {
    let tail = &points[points.len().saturating_sub(6)..];
    let bullish_score = tail.iter().filter(|p| matches!(p.label, SwingLabel::Hh | SwingLabel::Hl)).count();
    let bearish_score = tail.iter().filter(|p| matches!(p.label, SwingLabel::Lh | SwingLabel::Ll)).count();

    if bullish_score > bearish_score + 1 {
        Trend::Bullish
    } else if bearish_score > bullish_score + 1 {
        Trend::Bearish
    } else {
        Trend::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(hour: i64, o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar { timestamp: Utc.timestamp_opt(hour * 3600, 0).unwrap(), open: o, high: h, low: l, close: c, volume: 100.0 }
    }

    /// A zig-zag series: sharp swings up and down of growing amplitude, each well
    /// clear of the ATR floor, so dedup/labeling has unambiguous alternating input.
    fn zigzag_bars(legs: usize) -> Vec<Bar> {
        let mut bars = Vec::new();
        let mut t = 0i64;
        let mut base = 100.0;
        for leg in 0..legs {
            let amplitude = 10.0 + leg as f64 * 2.0;
            let peak = base + amplitude;
            for _ in 0..3 {
                bars.push(bar(t, base, peak, base - 1.0, peak - 0.5));
                t += 1;
            }
            let trough = peak - amplitude * 1.5;
            for _ in 0..3 {
                bars.push(bar(t, peak, peak + 1.0, trough, trough + 0.5));
                t += 1;
            }
            base = trough;
        }
        bars
    }

    #[test]
    fn rejects_too_few_bars() {
        let bars = vec![bar(0, 100.0, 101.0, 99.0, 100.0); 5];
        let result = compute_swing_structure(&bars, 3, 0.5);
        assert!(matches!(result, Err(ScanError::InsufficientData(_))));
    }

    #[test]
    fn swings_strictly_alternate_after_dedup() {
        let bars = zigzag_bars(8);
        let structure = compute_swing_structure(&bars, 2, 0.1).unwrap();
        for w in structure.points.windows(2) {
            assert_ne!(w[0].is_high, w[1].is_high);
        }
    }

    #[test]
    fn trend_prefers_bullish_when_higher_highs_dominate() {
        let points = vec![
            SwingPoint { price: 1.0, timestamp: Utc::now(), is_high: true, strength: 1.0, label: SwingLabel::Hh },
            SwingPoint { price: 1.0, timestamp: Utc::now(), is_high: false, strength: 1.0, label: SwingLabel::Hl },
            SwingPoint { price: 1.0, timestamp: Utc::now(), is_high: true, strength: 1.0, label: SwingLabel::Hh },
            SwingPoint { price: 1.0, timestamp: Utc::now(), is_high: false, strength: 1.0, label: SwingLabel::Hl },
        ];
        assert_eq!(derive_trend(&points), Trend::Bullish);
    }
}
