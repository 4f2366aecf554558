use market_types::{Bar, ScanError};

use crate::indicators::{atr, bollinger_bands, keltner_channels, macd, rsi};
use crate::traits::IndicatorEngine;
use crate::types::IndicatorSet;

const ATR_PERIOD: usize = 14;
const BB_PERIOD: usize = 20;
const BB_STD_DEV: f64 = 2.0;
const KC_EMA_PERIOD: usize = 20;
const KC_MULTIPLIER: f64 = 1.5;
const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const ATR_SERIES_LEN: usize = 20;

/// Reference indicator engine. Not a differentiator in its own right (§1 contract
/// boundary) — it exists so the rest of the pipeline has something real to run
/// against in tests and in the reference binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceIndicatorEngine;

impl IndicatorEngine for ReferenceIndicatorEngine {
    fn compute(&self, bars: &[Bar]) -> Result<IndicatorSet, ScanError> {
        if bars.is_empty() {
            return Err(ScanError::InsufficientData("indicator compute called with zero bars".into()));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let atr_series = atr(bars, ATR_PERIOD);
        let atr_latest = atr_series.last().copied();
        let atr_tail: Vec<f64> = atr_series.iter().rev().take(ATR_SERIES_LEN).rev().copied().collect();

        let bb = bollinger_bands(&closes, BB_PERIOD, BB_STD_DEV);
        let kc = keltner_channels(bars, KC_EMA_PERIOD, ATR_PERIOD, KC_MULTIPLIER);

        let (ttm_squeeze_on, ttm_squeeze_firing) = squeeze_state(&bb, &kc);

        let rsi_series = rsi(&closes, RSI_PERIOD);
        let macd_result = macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);

        Ok(IndicatorSet {
            atr: atr_latest,
            atr_series: atr_tail,
            bb_upper: bb.upper.last().copied(),
            bb_middle: bb.middle.last().copied(),
            bb_lower: bb.lower.last().copied(),
            kc_upper: kc.upper.last().copied(),
            kc_lower: kc.lower.last().copied(),
            ttm_squeeze_on,
            ttm_squeeze_firing,
            rsi: rsi_series.last().copied(),
            macd_histogram: macd_result.histogram.last().copied(),
        })
    }
}

/// Squeeze is "on" when Bollinger Bands sit fully inside the Keltner Channel
/// (compressed volatility). "Firing" marks the bar the squeeze just released.
fn squeeze_state(
    bb: &crate::indicators::BollingerBands,
    kc: &crate::indicators::KeltnerChannels,
) -> (bool, bool) {
    let last_on = match (bb.upper.last(), bb.lower.last(), kc.upper.last(), kc.lower.last()) {
        (Some(bu), Some(bl), Some(ku), Some(kl)) => bu <= ku && bl >= kl,
        _ => return (false, false),
    };

    if bb.upper.len() < 2 || kc.upper.len() < 2 {
        return (last_on, false);
    }

    let prev_on = match (
        bb.upper.get(bb.upper.len() - 2),
        bb.lower.get(bb.lower.len() - 2),
        kc.upper.get(kc.upper.len() - 2),
        kc.lower.get(kc.lower.len() - 2),
    ) {
        (Some(bu), Some(bl), Some(ku), Some(kl)) => bu <= ku && bl >= kl,
        _ => false,
    };

    (last_on, prev_on && !last_on)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(ts: i64, o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar { timestamp: Utc.timestamp_opt(ts, 0).unwrap(), open: o, high: h, low: l, close: c, volume: 1000.0 }
    }

    fn trending_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5;
                bar(i as i64 * 3600, base, base + 1.0, base - 1.0, base + 0.3)
            })
            .collect()
    }

    #[test]
    fn compute_rejects_empty_input() {
        let engine = ReferenceIndicatorEngine;
        assert!(matches!(engine.compute(&[]), Err(ScanError::InsufficientData(_))));
    }

    #[test]
    fn compute_produces_all_core_fields_given_enough_history() {
        let engine = ReferenceIndicatorEngine;
        let bars = trending_bars(60);
        let set = engine.compute(&bars).unwrap();
        assert!(set.atr.is_some());
        assert!(set.bb_upper.is_some());
        assert!(set.kc_upper.is_some());
        assert!(set.rsi.is_some());
    }

    #[test]
    fn missing_fields_are_none_not_zero() {
        let engine = ReferenceIndicatorEngine;
        let bars = trending_bars(5);
        let set = engine.compute(&bars).unwrap();
        assert_eq!(set.atr, None);
        assert_eq!(set.rsi, None);
    }
}
