use serde::{Deserialize, Serialize};

/// Per-timeframe indicator snapshot (§3). Missing readings are `None`, never a
/// zero sentinel — the scorer and regime detector both depend on that distinction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub atr: Option<f64>,
    pub atr_series: Vec<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub kc_upper: Option<f64>,
    pub kc_lower: Option<f64>,
    pub ttm_squeeze_on: bool,
    pub ttm_squeeze_firing: bool,
    pub rsi: Option<f64>,
    pub macd_histogram: Option<f64>,
}

/// Detection confidence grade attached to every SMC pattern instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternGrade {
    A,
    B,
    C,
}

/// Inclusive price range a pattern occupies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceZone {
    pub low: f64,
    pub high: f64,
}

impl PriceZone {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternDirection {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBlock {
    pub direction: PatternDirection,
    pub zone: PriceZone,
    pub anchor_index: usize,
    pub grade: PatternGrade,
    pub mitigated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairValueGap {
    pub direction: PatternDirection,
    pub zone: PriceZone,
    pub anchor_index: usize,
    pub grade: PatternGrade,
    pub mitigated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquiditySweep {
    pub direction: PatternDirection,
    pub level: f64,
    pub anchor_index: usize,
    pub grade: PatternGrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureEventKind {
    Bos,
    Choch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BosChoch {
    pub kind: StructureEventKind,
    pub direction: PatternDirection,
    pub anchor_index: usize,
    pub grade: PatternGrade,
}
