use market_types::{Bar, ScanError};

use crate::types::{BosChoch, FairValueGap, IndicatorSet, LiquiditySweep, OrderBlock};

/// Consumed-only interface (§4.1 dependency order, §6): the scorer and regime
/// detector program against this trait. No indicator math is a differentiator
/// here, so a single reference engine is the only implementation this crate ships.
pub trait IndicatorEngine: Send + Sync {
    fn compute(&self, bars: &[Bar]) -> Result<IndicatorSet, ScanError>;
}

/// Consumed-only interface for smart-money-concept primitives.
pub trait SmcPatternEngine: Send + Sync {
    fn detect_order_blocks(&self, bars: &[Bar]) -> Result<Vec<OrderBlock>, ScanError>;
    fn detect_fvgs(&self, bars: &[Bar]) -> Result<Vec<FairValueGap>, ScanError>;
    fn detect_liquidity_sweeps(&self, bars: &[Bar]) -> Result<Vec<LiquiditySweep>, ScanError>;
    fn detect_bos_choch(&self, bars: &[Bar]) -> Result<Vec<BosChoch>, ScanError>;
}
