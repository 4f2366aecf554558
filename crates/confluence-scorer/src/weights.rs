//! Per-mode-profile factor weight tables (§4.6). Weights are pinned constants,
//! not tuned at runtime, and must sum to 1.0 within a tight tolerance.

use crate::FACTOR_ORDER;
use market_types::{ModeProfile, ScanError};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Weight for each factor in [`FACTOR_ORDER`] order.
pub fn weights_for(mode: ModeProfile) -> [f64; 12] {
    match mode {
        ModeProfile::MacroSurveillance => [0.14, 0.10, 0.08, 0.06, 0.04, 0.04, 0.08, 0.08, 0.06, 0.06, 0.14, 0.12],
        ModeProfile::StealthBalanced => [0.16, 0.12, 0.12, 0.10, 0.06, 0.06, 0.10, 0.10, 0.06, 0.06, 0.04, 0.02],
        ModeProfile::IntradayAggressive => [0.14, 0.08, 0.16, 0.12, 0.10, 0.10, 0.08, 0.12, 0.06, 0.04, 0.00, 0.00],
        ModeProfile::Precision => [0.12, 0.08, 0.16, 0.16, 0.12, 0.12, 0.08, 0.06, 0.04, 0.04, 0.01, 0.01],
    }
}

/// Checks every mode profile's weight table sums to 1.0 within tolerance.
/// Called once at application startup; a failure here is an `InvalidConfig`
/// fatal error, never a silent fallback.
pub fn validate_weight_tables() -> Result<(), ScanError> {
    for mode in ModeProfile::ALL {
        let sum: f64 = weights_for(mode).iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ScanError::InvalidConfig(format!(
                "factor weights for {mode} sum to {sum}, expected 1.0 (±{WEIGHT_SUM_TOLERANCE})"
            )));
        }
    }
    let _ = FACTOR_ORDER;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_profile_weight_table_sums_to_one() {
        validate_weight_tables().unwrap();
    }
}
