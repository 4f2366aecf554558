//! Portfolio-level risk gate (§4.9). All mutable state — positions, trade
//! history, the correlation matrix — lives behind one lock for the lifetime
//! of the scanner process; nothing here touches a database.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{Duration, Utc};
use market_types::{Direction, ScanError};

use crate::models::{Position, RiskCheck, RiskLimits, Trade};

/// Compiled-in correlation fallback, consulted only until the first
/// `update_correlations` call populates the dynamic matrix.
const STATIC_CORRELATION_GROUPS: &[(&str, &[&str])] = &[
    ("majors", &["BTC/USDT", "ETH/USDT", "BNB/USDT"]),
    ("large_cap_alts", &["SOL/USDT", "XRP/USDT", "ADA/USDT", "AVAX/USDT", "LINK/USDT"]),
    ("stable_pegged", &["USDC/USDT", "DAI/USDT", "TUSD/USDT", "FDUSD/USDT"]),
];

struct State {
    account_balance: f64,
    initial_balance: f64,
    positions: HashMap<String, Position>,
    trade_history: Vec<Trade>,
    correlation_matrix: HashMap<String, HashMap<String, f64>>,
}

pub struct RiskManager {
    limits: RiskLimits,
    state: Mutex<State>,
}

impl RiskManager {
    pub fn new(account_balance: f64, limits: RiskLimits) -> Result<Self, ScanError> {
        if account_balance <= 0.0 {
            return Err(ScanError::InvalidConfig(format!("account balance must be positive, got {account_balance}")));
        }
        if limits.max_open_positions < 1 {
            return Err(ScanError::InvalidConfig("max_open_positions must be >= 1".into()));
        }
        tracing::info!(account_balance, max_asset_exposure_pct = limits.max_asset_exposure_pct, "risk manager initialized");
        Ok(Self {
            limits,
            state: Mutex::new(State {
                account_balance,
                initial_balance: account_balance,
                positions: HashMap::new(),
                trade_history: Vec::new(),
                correlation_matrix: HashMap::new(),
            }),
        })
    }

    /// Runs the six pre-trade checks in order; the first failure short-circuits.
    pub fn validate_new_trade(&self, symbol: &str, direction: Direction, position_value: f64, risk_amount: f64) -> RiskCheck {
        let _ = (direction, risk_amount);
        let state = self.state.lock().unwrap();

        if state.positions.len() >= self.limits.max_open_positions && !state.positions.contains_key(symbol) {
            return RiskCheck::fail(
                "max_open_positions",
                format!("max open positions reached ({})", self.limits.max_open_positions),
            );
        }

        let current_exposure = state.positions.get(symbol).map(Position::notional_value).unwrap_or(0.0);
        let new_exposure = current_exposure + position_value;
        let max_exposure = state.account_balance * self.limits.max_asset_exposure_pct / 100.0;
        if new_exposure > max_exposure {
            return RiskCheck::fail(
                "asset_exposure",
                format!("asset exposure ${new_exposure:.2} exceeds ${max_exposure:.2} ({}% of account)", self.limits.max_asset_exposure_pct),
            );
        }

        let correlated_exposure = self.correlated_exposure(&state, symbol);
        let new_correlated = correlated_exposure + position_value;
        let max_correlated = state.account_balance * self.limits.max_correlated_exposure_pct / 100.0;
        if new_correlated > max_correlated {
            return RiskCheck::fail(
                "correlated_exposure",
                format!("correlated exposure ${new_correlated:.2} exceeds ${max_correlated:.2} ({}% of account)", self.limits.max_correlated_exposure_pct),
            );
        }

        let daily_loss = Self::period_loss(&state.trade_history, 24);
        let max_daily_loss = state.account_balance * self.limits.max_daily_loss_pct / 100.0;
        if daily_loss >= max_daily_loss {
            return RiskCheck::fail(
                "daily_loss_limit",
                format!("daily loss ${daily_loss:.2} hit limit ${max_daily_loss:.2} ({}% of account)", self.limits.max_daily_loss_pct),
            );
        }

        let weekly_loss = Self::period_loss(&state.trade_history, 168);
        let max_weekly_loss = state.account_balance * self.limits.max_weekly_loss_pct / 100.0;
        if weekly_loss >= max_weekly_loss {
            return RiskCheck::fail(
                "weekly_loss_limit",
                format!("weekly loss ${weekly_loss:.2} hit limit ${max_weekly_loss:.2} ({}% of account)", self.limits.max_weekly_loss_pct),
            );
        }

        let max_position_value = state.account_balance * self.limits.max_position_concentration_pct / 100.0;
        if position_value > max_position_value {
            return RiskCheck::fail(
                "position_concentration",
                format!("position value ${position_value:.2} exceeds ${max_position_value:.2} ({}% of account)", self.limits.max_position_concentration_pct),
            );
        }

        RiskCheck::pass()
    }

    fn correlated_exposure(&self, state: &State, symbol: &str) -> f64 {
        if let Some(row) = state.correlation_matrix.get(symbol) {
            return state
                .positions
                .iter()
                .filter(|(pos_symbol, _)| row.get(*pos_symbol).map(|c| c.abs() >= self.limits.correlation_threshold).unwrap_or(false))
                .map(|(_, pos)| pos.notional_value())
                .sum();
        }

        let correlated_symbols: HashSet<&str> = STATIC_CORRELATION_GROUPS
            .iter()
            .filter(|(_, members)| members.contains(&symbol))
            .flat_map(|(_, members)| members.iter().copied())
            .collect();

        if correlated_symbols.is_empty() {
            return state.positions.get(symbol).map(Position::notional_value).unwrap_or(0.0);
        }

        state
            .positions
            .iter()
            .filter(|(pos_symbol, _)| correlated_symbols.contains(pos_symbol.as_str()))
            .map(|(_, pos)| pos.notional_value())
            .sum()
    }

    fn period_loss(trade_history: &[Trade], hours: i64) -> f64 {
        let cutoff = Utc::now() - Duration::hours(hours);
        let period_pnl: f64 = trade_history.iter().filter(|t| t.closed_at >= cutoff).map(|t| t.pnl).sum();
        period_pnl.min(0.0).abs()
    }

    pub fn add_position(&self, position: Position) {
        tracing::info!(symbol = %position.symbol, direction = ?position.direction, quantity = position.quantity, entry = position.entry_price, "position added");
        let mut state = self.state.lock().unwrap();
        state.positions.insert(position.symbol.clone(), position);
    }

    pub fn update_position(&self, symbol: &str, current_price: f64) -> Result<(), ScanError> {
        let mut state = self.state.lock().unwrap();
        let position = state.positions.get_mut(symbol).ok_or_else(|| ScanError::InvalidArgument(format!("no open position for {symbol}")))?;
        position.current_price = current_price;
        position.unrealized_pnl = match position.direction {
            Direction::Long => (current_price - position.entry_price) * position.quantity,
            Direction::Short => (position.entry_price - current_price) * position.quantity,
        };
        Ok(())
    }

    pub fn close_position(&self, symbol: &str, exit_price: f64) -> Result<Trade, ScanError> {
        let mut state = self.state.lock().unwrap();
        let position = state.positions.remove(symbol).ok_or_else(|| ScanError::InvalidArgument(format!("no open position for {symbol}")))?;
        let pnl = match position.direction {
            Direction::Long => (exit_price - position.entry_price) * position.quantity,
            Direction::Short => (position.entry_price - exit_price) * position.quantity,
        };
        let trade = Trade { symbol: symbol.to_string(), direction: position.direction, pnl, closed_at: Utc::now() };
        state.trade_history.push(trade.clone());
        state.account_balance += pnl;
        tracing::info!(symbol, pnl, "position closed");
        Ok(trade)
    }

    /// Replaces the correlation matrix atomically from `symbol -> close price series`.
    pub fn update_correlations(&self, price_data: &HashMap<String, Vec<f64>>) {
        if price_data.is_empty() {
            tracing::warn!("empty price data, correlation matrix not updated");
            return;
        }

        let returns: HashMap<&str, Vec<f64>> = price_data
            .iter()
            .filter_map(|(symbol, prices)| {
                if prices.len() < 2 {
                    return None;
                }
                let r: Vec<f64> = prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
                Some((symbol.as_str(), r))
            })
            .collect();

        if returns.is_empty() {
            tracing::warn!("no valid returns series, correlation matrix not updated");
            return;
        }

        let symbols: Vec<&str> = returns.keys().copied().collect();
        let mut matrix = HashMap::new();
        for &s1 in &symbols {
            let mut row = HashMap::new();
            for &s2 in &symbols {
                let corr = if s1 == s2 { 1.0 } else { pearson_correlation(&returns[s1], &returns[s2]) };
                row.insert(s2.to_string(), corr);
            }
            matrix.insert(s1.to_string(), row);
        }

        let mut state = self.state.lock().unwrap();
        state.correlation_matrix = matrix;
    }

    pub fn balance(&self) -> f64 {
        self.state.lock().unwrap().account_balance
    }

    pub fn equity(&self) -> f64 {
        let state = self.state.lock().unwrap();
        state.account_balance + state.positions.values().map(|p| p.unrealized_pnl).sum::<f64>()
    }

    pub fn drawdown_pct(&self) -> f64 {
        let state = self.state.lock().unwrap();
        if state.initial_balance == 0.0 {
            return 0.0;
        }
        let equity = state.account_balance + state.positions.values().map(|p| p.unrealized_pnl).sum::<f64>();
        (state.initial_balance - equity) / state.initial_balance * 100.0
    }

    pub fn position_count(&self) -> usize {
        self.state.lock().unwrap().positions.len()
    }

    pub fn total_exposure(&self) -> f64 {
        self.state.lock().unwrap().positions.values().map(Position::notional_value).sum()
    }
}

fn pearson_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - mean_a) * (y - mean_b)).sum();
    let var_a: f64 = a.iter().map(|x| (x - mean_a).powi(2)).sum();
    let var_b: f64 = b.iter().map(|y| (y - mean_b).powi(2)).sum();
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (cov / denom).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(balance: f64) -> RiskManager {
        RiskManager::new(balance, RiskLimits::default()).unwrap()
    }

    #[test]
    fn rejects_nonpositive_balance() {
        assert!(matches!(RiskManager::new(0.0, RiskLimits::default()), Err(ScanError::InvalidConfig(_))));
    }

    #[test]
    fn passes_when_well_within_all_limits() {
        let mgr = manager(10_000.0);
        let check = mgr.validate_new_trade("BTC/USDT", Direction::Long, 500.0, 50.0);
        assert!(check.passed);
    }

    #[test]
    fn rejects_a_position_too_large_for_a_single_asset() {
        let mgr = manager(10_000.0);
        let check = mgr.validate_new_trade("BTC/USDT", Direction::Long, 3_000.0, 100.0);
        assert_eq!(check.limits_hit, vec!["asset_exposure".to_string()]);
    }

    #[test]
    fn daily_loss_limit_blocks_further_trades() {
        let mgr = manager(10_000.0);
        for pnl in [-200.0, -250.0, -50.0, -1.0] {
            mgr.add_position(Position {
                symbol: "ETH/USDT".into(),
                direction: Direction::Long,
                quantity: 1.0,
                entry_price: 100.0,
                current_price: 100.0,
                unrealized_pnl: 0.0,
                opened_at: Utc::now(),
            });
            mgr.close_position("ETH/USDT", 100.0 + pnl).unwrap();
        }
        let check = mgr.validate_new_trade("BTC/USDT", Direction::Long, 100.0, 10.0);
        assert_eq!(check.limits_hit, vec!["daily_loss_limit".to_string()]);
    }

    #[test]
    fn correlated_static_group_blocks_a_second_major() {
        let mut limits = RiskLimits::default();
        limits.max_correlated_exposure_pct = 10.0;
        let mgr = RiskManager::new(10_000.0, limits).unwrap();
        mgr.add_position(Position {
            symbol: "BTC/USDT".into(),
            direction: Direction::Long,
            quantity: 1.0,
            entry_price: 900.0,
            current_price: 900.0,
            unrealized_pnl: 0.0,
            opened_at: Utc::now(),
        });
        let check = mgr.validate_new_trade("ETH/USDT", Direction::Long, 200.0, 20.0);
        assert_eq!(check.limits_hit, vec!["correlated_exposure".to_string()]);
    }

    #[test]
    fn pearson_correlation_of_identical_series_is_one() {
        let series = vec![100.0, 101.0, 99.0, 102.0, 98.0];
        assert!((pearson_correlation(&series, &series) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pearson_correlation_of_a_constant_series_is_zero_not_nan() {
        let constant = vec![100.0, 100.0, 100.0, 100.0];
        let other = vec![100.0, 101.0, 99.0, 102.0];
        assert_eq!(pearson_correlation(&constant, &other), 0.0);
    }

    #[test]
    fn update_correlations_is_idempotent() {
        let mgr = manager(10_000.0);
        let mut prices = HashMap::new();
        prices.insert("BTC/USDT".to_string(), vec![100.0, 101.0, 99.0, 102.0, 103.0]);
        prices.insert("ETH/USDT".to_string(), vec![10.0, 10.2, 9.9, 10.3, 10.4]);
        mgr.update_correlations(&prices);
        let first = mgr.state.lock().unwrap().correlation_matrix.clone();
        mgr.update_correlations(&prices);
        let second = mgr.state.lock().unwrap().correlation_matrix.clone();
        assert_eq!(first.len(), second.len());
    }
}
