//! Portfolio state types (§4.9): open positions, closed trades, and the
//! result of a pre-trade validation pass.

use chrono::{DateTime, Utc};
use market_types::Direction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn notional_value(&self) -> f64 {
        self.quantity * self.current_price
    }

    pub fn pnl_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        match self.direction {
            Direction::Long => (self.current_price - self.entry_price) / self.entry_price * 100.0,
            Direction::Short => (self.entry_price - self.current_price) / self.entry_price * 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub direction: Direction,
    pub pnl: f64,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCheck {
    pub passed: bool,
    pub reason: String,
    pub limits_hit: Vec<String>,
}

impl RiskCheck {
    pub fn pass() -> Self {
        Self { passed: true, reason: "all risk checks passed".to_string(), limits_hit: vec![] }
    }

    pub fn fail(limit: &str, reason: impl Into<String>) -> Self {
        Self { passed: false, reason: reason.into(), limits_hit: vec![limit.to_string()] }
    }
}

#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_open_positions: usize,
    pub max_asset_exposure_pct: f64,
    pub max_correlated_exposure_pct: f64,
    pub max_daily_loss_pct: f64,
    pub max_weekly_loss_pct: f64,
    pub max_position_concentration_pct: f64,
    pub correlation_threshold: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_open_positions: 5,
            max_asset_exposure_pct: 20.0,
            max_correlated_exposure_pct: 40.0,
            max_daily_loss_pct: 5.0,
            max_weekly_loss_pct: 10.0,
            max_position_concentration_pct: 25.0,
            correlation_threshold: 0.7,
        }
    }
}
