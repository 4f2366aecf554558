//! Position sizing strategies (§4.9). Each strategy reduces to a common
//! constraint pipeline: minimum order value, maximum position size, then
//! margin against account balance.

use market_types::ScanError;
use serde::{Deserialize, Serialize};

/// Result of a sizing calculation. `quantity`, `notional_value`, `risk_amount`
/// are always `>= 0`; `risk_percentage` is always in `[0, 100]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSize {
    pub quantity: f64,
    pub notional_value: f64,
    pub risk_amount: f64,
    pub risk_percentage: f64,
    pub position_percentage: f64,
    pub method: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizer {
    pub account_balance: f64,
    pub max_position_pct: f64,
    pub max_risk_pct: f64,
    pub min_order_value: f64,
}

impl PositionSizer {
    pub fn new(account_balance: f64, max_position_pct: f64, max_risk_pct: f64, min_order_value: f64) -> Result<Self, ScanError> {
        if account_balance <= 0.0 {
            return Err(ScanError::InvalidConfig(format!("account balance must be positive, got {account_balance}")));
        }
        if !(max_position_pct > 0.0 && max_position_pct <= 100.0) {
            return Err(ScanError::InvalidConfig(format!("max_position_pct must be 0-100, got {max_position_pct}")));
        }
        if !(max_risk_pct > 0.0 && max_risk_pct <= 100.0) {
            return Err(ScanError::InvalidConfig(format!("max_risk_pct must be 0-100, got {max_risk_pct}")));
        }
        if min_order_value < 0.0 {
            return Err(ScanError::InvalidConfig(format!("min_order_value must be >= 0, got {min_order_value}")));
        }
        Ok(Self { account_balance, max_position_pct, max_risk_pct, min_order_value })
    }

    pub fn default_for_balance(account_balance: f64) -> Result<Self, ScanError> {
        Self::new(account_balance, 25.0, 2.0, 10.0)
    }

    /// Risks a fixed percentage of the account against the entry-to-stop distance.
    pub fn fixed_fractional(&self, risk_pct: f64, entry: f64, stop: f64, leverage: f64) -> Result<PositionSize, ScanError> {
        if !(risk_pct > 0.0 && risk_pct <= self.max_risk_pct) {
            return Err(ScanError::InvalidArgument(format!("risk_pct must be 0-{}, got {risk_pct}", self.max_risk_pct)));
        }
        validate_entry_stop_leverage(entry, stop, leverage)?;

        let risk_amount = self.account_balance * (risk_pct / 100.0);
        let stop_distance = (entry - stop).abs();
        let quantity = risk_amount / stop_distance;
        let notional_value = quantity * entry;

        let (quantity, notional_value, actual_risk) = self.apply_constraints(quantity, notional_value, stop_distance, leverage);
        let position_pct = notional_value / self.account_balance * 100.0;
        let risk_pct_actual = actual_risk / self.account_balance * 100.0;

        Ok(PositionSize {
            quantity,
            notional_value,
            risk_amount: actual_risk,
            risk_percentage: risk_pct_actual,
            position_percentage: position_pct,
            method: "fixed_fractional".to_string(),
            metadata: serde_json::json!({
                "target_risk_pct": risk_pct,
                "entry_price": entry,
                "stop_price": stop,
                "stop_distance": stop_distance,
                "leverage": leverage,
            }),
        })
    }

    /// Kelly Criterion, fractional. Negative edge clamps to zero risk, not a negative quantity.
    pub fn kelly(&self, win_rate: f64, avg_win_r: f64, avg_loss_r: f64, entry: f64, stop: f64, kelly_fraction: f64, leverage: f64) -> Result<PositionSize, ScanError> {
        if !(win_rate > 0.0 && win_rate < 1.0) {
            return Err(ScanError::InvalidArgument(format!("win_rate must be 0-1, got {win_rate}")));
        }
        if avg_win_r <= 0.0 {
            return Err(ScanError::InvalidArgument(format!("avg_win must be positive, got {avg_win_r}")));
        }
        if avg_loss_r <= 0.0 {
            return Err(ScanError::InvalidArgument(format!("avg_loss must be positive, got {avg_loss_r}")));
        }
        if !(kelly_fraction > 0.0 && kelly_fraction <= 1.0) {
            return Err(ScanError::InvalidArgument(format!("kelly_fraction must be 0-1, got {kelly_fraction}")));
        }
        validate_entry_stop_leverage(entry, stop, leverage)?;

        let b = avg_win_r / avg_loss_r;
        let raw_kelly_pct = ((win_rate * b) - (1.0 - win_rate)) / b;
        let fractional_kelly_pct = raw_kelly_pct * kelly_fraction;
        let capped_kelly_pct = fractional_kelly_pct.max(0.0).min(self.max_risk_pct / 100.0);
        let risk_pct = (capped_kelly_pct * 100.0).min(self.max_risk_pct);

        if risk_pct <= 0.0 {
            return Ok(PositionSize {
                quantity: 0.0,
                notional_value: 0.0,
                risk_amount: 0.0,
                risk_percentage: 0.0,
                position_percentage: 0.0,
                method: "kelly_criterion".to_string(),
                metadata: serde_json::json!({
                    "win_rate": win_rate,
                    "avg_win_r": avg_win_r,
                    "avg_loss_r": avg_loss_r,
                    "payoff_ratio": b,
                    "kelly_pct": fractional_kelly_pct * 100.0,
                    "kelly_fraction": kelly_fraction,
                    "negative_edge": true,
                }),
            });
        }

        let mut result = self.fixed_fractional(risk_pct, entry, stop, leverage)?;
        result.method = "kelly_criterion".to_string();
        result.metadata = serde_json::json!({
            "win_rate": win_rate,
            "avg_win_r": avg_win_r,
            "avg_loss_r": avg_loss_r,
            "payoff_ratio": b,
            "kelly_pct": fractional_kelly_pct * 100.0,
            "kelly_fraction": kelly_fraction,
            "capped_at_max_risk": fractional_kelly_pct * 100.0 > self.max_risk_pct,
        });
        Ok(result)
    }

    /// Sets stop distance as `atr * atr_multiplier`, assumes a long-style stop below entry.
    pub fn atr_based(&self, atr: f64, atr_multiplier: f64, entry: f64, risk_pct: Option<f64>, leverage: f64) -> Result<PositionSize, ScanError> {
        if atr <= 0.0 {
            return Err(ScanError::InvalidArgument(format!("ATR must be positive, got {atr}")));
        }
        if atr_multiplier <= 0.0 {
            return Err(ScanError::InvalidArgument(format!("ATR multiplier must be positive, got {atr_multiplier}")));
        }
        if entry <= 0.0 {
            return Err(ScanError::InvalidArgument(format!("entry price must be positive, got {entry}")));
        }
        let risk_pct = risk_pct.unwrap_or(self.max_risk_pct);
        let stop_distance = atr * atr_multiplier;
        let stop = entry - stop_distance;

        let mut result = self.fixed_fractional(risk_pct, entry, stop, leverage)?;
        result.method = "atr_based".to_string();
        result.metadata = serde_json::json!({
            "atr": atr,
            "atr_multiplier": atr_multiplier,
            "stop_distance": stop_distance,
        });
        Ok(result)
    }

    /// Sizes to a fixed dollar risk amount, independent of account percentage.
    pub fn fixed_dollar_risk(&self, risk_amount: f64, entry: f64, stop: f64, leverage: f64) -> Result<PositionSize, ScanError> {
        if risk_amount <= 0.0 {
            return Err(ScanError::InvalidArgument(format!("risk amount must be positive, got {risk_amount}")));
        }
        if risk_amount > self.account_balance {
            return Err(ScanError::InvalidArgument(format!("risk amount ({risk_amount}) exceeds account balance ({})", self.account_balance)));
        }
        validate_entry_stop_leverage(entry, stop, leverage)?;

        let stop_distance = (entry - stop).abs();
        let quantity = risk_amount / stop_distance;
        let notional_value = quantity * entry;

        let (quantity, notional_value, actual_risk) = self.apply_constraints(quantity, notional_value, stop_distance, leverage);
        let position_pct = notional_value / self.account_balance * 100.0;
        let risk_pct = actual_risk / self.account_balance * 100.0;

        Ok(PositionSize {
            quantity,
            notional_value,
            risk_amount: actual_risk,
            risk_percentage: risk_pct,
            position_percentage: position_pct,
            method: "fixed_dollar_risk".to_string(),
            metadata: serde_json::json!({
                "target_risk_amount": risk_amount,
                "entry_price": entry,
                "stop_price": stop,
                "stop_distance": stop_distance,
                "leverage": leverage,
            }),
        })
    }

    /// Scales quantity/notional down (or up to the minimum), returning `(quantity, notional, actual_risk)`.
    fn apply_constraints(&self, mut quantity: f64, mut notional_value: f64, stop_distance: f64, leverage: f64) -> (f64, f64, f64) {
        if notional_value < self.min_order_value {
            let scale = self.min_order_value / notional_value;
            quantity *= scale;
            notional_value = self.min_order_value;
        }

        let max_position_value = self.account_balance * (self.max_position_pct / 100.0);
        if notional_value > max_position_value {
            let scale = max_position_value / notional_value;
            quantity *= scale;
            notional_value = max_position_value;
        }

        let margin_required = notional_value / leverage;
        if margin_required > self.account_balance {
            let scale = (self.account_balance * leverage) / notional_value;
            quantity *= scale;
            notional_value = self.account_balance * leverage;
        }

        let actual_risk = quantity * stop_distance;
        (quantity, notional_value, actual_risk)
    }
}

fn validate_entry_stop_leverage(entry: f64, stop: f64, leverage: f64) -> Result<(), ScanError> {
    if entry <= 0.0 {
        return Err(ScanError::InvalidArgument(format!("entry price must be positive, got {entry}")));
    }
    if stop <= 0.0 {
        return Err(ScanError::InvalidArgument(format!("stop price must be positive, got {stop}")));
    }
    if entry == stop {
        return Err(ScanError::InvalidArgument("entry and stop prices must differ".to_string()));
    }
    if leverage < 1.0 {
        return Err(ScanError::InvalidArgument(format!("leverage must be >= 1.0, got {leverage}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer() -> PositionSizer {
        PositionSizer::new(10_000.0, 25.0, 2.0, 10.0).unwrap()
    }

    #[test]
    fn fixed_fractional_sizes_to_the_risk_budget() {
        let s = sizer();
        let result = s.fixed_fractional(1.0, 50_000.0, 49_000.0, 1.0).unwrap();
        // risk_amount = 100, stop_distance = 1000 -> quantity = 0.1
        assert!((result.quantity - 0.1).abs() < 1e-9);
        assert!((result.risk_amount - 100.0).abs() < 1e-9);
    }

    #[test]
    fn entry_equal_stop_is_rejected_before_division() {
        let s = sizer();
        let err = s.fixed_fractional(1.0, 100.0, 100.0, 1.0).unwrap_err();
        assert!(matches!(err, ScanError::InvalidArgument(_)));
    }

    #[test]
    fn kelly_negative_edge_clamps_to_zero_quantity() {
        let s = sizer();
        let result = s.kelly(0.4, 1.0, 1.0, 100.0, 95.0, 0.25, 1.0).unwrap();
        assert_eq!(result.quantity, 0.0);
        assert_eq!(result.metadata["negative_edge"], true);
    }

    #[test]
    fn kelly_positive_edge_delegates_to_fixed_fractional() {
        let s = sizer();
        let result = s.kelly(0.65, 2.5, 1.0, 50_000.0, 49_000.0, 0.25, 1.0).unwrap();
        assert_eq!(result.method, "kelly_criterion");
        assert!(result.quantity > 0.0);
        assert!(result.risk_percentage <= s.max_risk_pct + 1e-9);
    }

    #[test]
    fn atr_based_uses_atr_times_multiplier_as_stop_distance() {
        let s = sizer();
        let result = s.atr_based(500.0, 2.0, 50_000.0, Some(1.0), 1.0).unwrap();
        assert_eq!(result.metadata["stop_distance"], 1000.0);
    }

    #[test]
    fn notional_below_minimum_scales_up() {
        let s = PositionSizer::new(10_000.0, 25.0, 2.0, 50.0).unwrap();
        let result = s.fixed_dollar_risk(1.0, 100.0, 99.0, 1.0).unwrap();
        assert!((result.notional_value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn notional_above_max_position_scales_down() {
        let s = sizer();
        let result = s.fixed_fractional(2.0, 100.0, 99.0, 1.0).unwrap();
        let max_position_value = s.account_balance * s.max_position_pct / 100.0;
        assert!((result.notional_value - max_position_value).abs() < 1e-6);
    }

    #[test]
    fn leverage_reduces_margin_but_not_quantity_before_margin_cap() {
        let s = sizer();
        let unleveraged = s.fixed_fractional(1.0, 50_000.0, 49_000.0, 1.0).unwrap();
        let leveraged = s.fixed_fractional(1.0, 50_000.0, 49_000.0, 5.0).unwrap();
        assert!((unleveraged.quantity - leveraged.quantity).abs() < 1e-9);
    }

    #[test]
    fn fixed_dollar_risk_exceeding_balance_is_rejected() {
        let s = sizer();
        let err = s.fixed_dollar_risk(20_000.0, 100.0, 95.0, 1.0).unwrap_err();
        assert!(matches!(err, ScanError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_nonpositive_account_balance() {
        assert!(matches!(PositionSizer::new(0.0, 25.0, 2.0, 10.0), Err(ScanError::InvalidConfig(_))));
    }
}
