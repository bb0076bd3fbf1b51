//! Performance Database
//!
//! Bounded trade history and metrics calculation:
//! - Keeps the most recent N closed trades
//! - Calculates win rate, Sharpe ratio, profit factor, drawdown, streaks
//! - Counts outcomes per failure type
//! - Tallies per-indicator wins and losses over attributable trades only

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::utils::types::{FailureType, Indicator, TradeRecord};

/// Performance metrics over the stored history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Total number of trades
    pub total_trades: u32,
    /// Number of winning trades
    pub winning_trades: u32,
    /// Number of losing trades
    pub losing_trades: u32,
    /// Win rate (0-1)
    pub win_rate: f64,
    /// Win rate excluding news-driven losses
    pub attributable_win_rate: f64,
    /// Sum of winning returns
    pub gross_profit: f64,
    /// Sum of losing returns (positive)
    pub gross_loss: f64,
    /// Net return
    pub net_return: f64,
    /// Profit factor (gross_profit / gross_loss), None while there are no losses
    pub profit_factor: Option<f64>,
    /// Average win
    pub avg_win: f64,
    /// Average loss
    pub avg_loss: f64,
    /// Expectancy per trade
    pub expectancy: f64,
    /// Average hold time (hours)
    pub avg_hold_hours: f64,
    /// Sharpe ratio (annualized)
    pub sharpe_ratio: f64,
    /// Maximum drawdown (%)
    pub max_drawdown_pct: f64,
    /// Best trade return
    pub best_trade: f64,
    /// Worst trade return
    pub worst_trade: f64,
    /// Current streak (positive = wins, negative = losses)
    pub current_streak: i32,
    /// Longest win streak
    pub longest_win_streak: u32,
    /// Longest loss streak
    pub longest_loss_streak: u32,
    /// Losses per failure type
    pub logic_failures: u32,
    pub news_failures: u32,
    pub mixed_failures: u32,
}

/// Wins and losses for trades where an indicator agreed with the trade direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorTally {
    pub wins: u32,
    pub losses: u32,
}

impl IndicatorTally {
    pub fn total(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> Option<f64> {
        (self.total() > 0).then(|| self.wins as f64 / self.total() as f64)
    }
}

/// Bounded most-recent-N trade history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistory {
    records: VecDeque<TradeRecord>,
    #[serde(skip, default = "default_capacity")]
    capacity: usize,
}

fn default_capacity() -> usize { 1000 }

impl Default for TradeHistory {
    fn default() -> Self {
        Self::new(default_capacity())
    }
}

impl TradeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Apply a capacity, dropping the oldest records beyond it
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
        self
    }

    /// Append a closed trade; returns the evicted oldest record, if any
    pub fn push(&mut self, record: TradeRecord) -> Option<TradeRecord> {
        self.records.push_back(record);
        if self.records.len() > self.capacity {
            self.records.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter()
    }

    /// Non-news records among the most recent `window`, oldest first
    pub fn attributable_window(&self, window: usize) -> Vec<TradeRecord> {
        let skip = self.records.len().saturating_sub(window);
        self.records
            .iter()
            .skip(skip)
            .filter(|r| r.is_attributable())
            .cloned()
            .collect()
    }

    /// Win rate over attributable trades, None without data
    pub fn attributable_win_rate(&self) -> Option<f64> {
        let refs: Vec<&TradeRecord> = self.records.iter().filter(|r| r.is_attributable()).collect();
        (!refs.is_empty()).then(|| Self::win_rate_of(&refs))
    }

    /// Per-indicator agreeing wins and losses, news-driven trades excluded
    pub fn indicator_tallies(&self) -> BTreeMap<Indicator, IndicatorTally> {
        let attributable: Vec<&TradeRecord> = self.records.iter().filter(|r| r.is_attributable()).collect();
        tally_indicators(attributable)
    }

    /// Recalculate all metrics from the stored records
    pub fn metrics(&self) -> PerformanceMetrics {
        let trades: Vec<&TradeRecord> = self.records.iter().collect();
        if trades.is_empty() {
            return PerformanceMetrics::default();
        }

        let total_trades = trades.len() as u32;
        let winning_trades = trades.iter().filter(|t| t.is_winner()).count() as u32;
        let losing_trades = total_trades - winning_trades;
        let win_rate = Self::win_rate_of(&trades);

        let gross_profit: f64 = trades.iter().filter(|t| t.return_pct > 0.0).map(|t| t.return_pct).sum();
        let gross_loss: f64 = trades.iter().filter(|t| t.return_pct < 0.0).map(|t| t.return_pct.abs()).sum();
        let net_return: f64 = trades.iter().map(|t| t.return_pct).sum();

        let profit_factor = (gross_loss > 0.0).then(|| gross_profit / gross_loss);

        let avg_win = if winning_trades > 0 { gross_profit / winning_trades as f64 } else { 0.0 };
        let avg_loss = if losing_trades > 0 { gross_loss / losing_trades as f64 } else { 0.0 };

        // Expectancy = (Win% × Avg Win) - (Loss% × Avg Loss)
        let expectancy = (win_rate * avg_win) - ((1.0 - win_rate) * avg_loss);

        let avg_hold_hours = trades.iter().map(|t| t.hold_hours).sum::<f64>() / total_trades as f64;
        let best_trade = trades.iter().map(|t| t.return_pct).fold(f64::NEG_INFINITY, f64::max);
        let worst_trade = trades.iter().map(|t| t.return_pct).fold(f64::INFINITY, f64::min);

        let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        let sharpe_ratio = Self::calculate_sharpe(&returns);
        let max_drawdown_pct = Self::calculate_max_drawdown(&returns);
        let (current_streak, longest_win, longest_loss) = Self::calculate_streaks(&trades);

        let count_of = |ft: FailureType| trades.iter().filter(|t| t.failure_type == ft).count() as u32;

        PerformanceMetrics {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            attributable_win_rate: self.attributable_win_rate().unwrap_or(0.0),
            gross_profit,
            gross_loss,
            net_return,
            profit_factor,
            avg_win,
            avg_loss,
            expectancy,
            avg_hold_hours,
            sharpe_ratio,
            max_drawdown_pct,
            best_trade,
            worst_trade,
            current_streak,
            longest_win_streak: longest_win,
            longest_loss_streak: longest_loss,
            logic_failures: count_of(FailureType::Logic),
            news_failures: count_of(FailureType::News),
            mixed_failures: count_of(FailureType::Mixed),
        }
    }

    /// Calculate Sharpe ratio (annualized)
    fn calculate_sharpe(returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }

        let mean: f64 = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
        let std_dev = variance.sqrt();

        if std_dev == 0.0 {
            return 0.0;
        }

        // Hourly cycles, roughly 250 trades a year
        let trades_per_year = 250.0_f64;
        (mean / std_dev) * trades_per_year.sqrt()
    }

    /// Maximum drawdown of the compounded return curve, in percent
    fn calculate_max_drawdown(returns: &[f64]) -> f64 {
        let mut equity = 1.0_f64;
        let mut peak = 1.0_f64;
        let mut max_dd = 0.0_f64;

        for r in returns {
            equity *= 1.0 + r;
            peak = peak.max(equity);
            if peak > 0.0 {
                max_dd = max_dd.max((peak - equity) / peak * 100.0);
            }
        }

        max_dd
    }

    /// Calculate win/loss streaks
    fn calculate_streaks(trades: &[&TradeRecord]) -> (i32, u32, u32) {
        let mut longest_win: u32 = 0;
        let mut longest_loss: u32 = 0;
        let mut current_win: u32 = 0;
        let mut current_loss: u32 = 0;

        for trade in trades {
            if trade.is_winner() {
                current_win += 1;
                current_loss = 0;
                longest_win = longest_win.max(current_win);
            } else {
                current_loss += 1;
                current_win = 0;
                longest_loss = longest_loss.max(current_loss);
            }
        }

        let current_streak = match trades.last() {
            Some(last) if last.is_winner() => current_win as i32,
            Some(_) => -(current_loss as i32),
            None => 0,
        };

        (current_streak, longest_win, longest_loss)
    }

    fn win_rate_of(trades: &[&TradeRecord]) -> f64 {
        if trades.is_empty() {
            return 0.0;
        }
        let wins = trades.iter().filter(|t| t.is_winner()).count();
        wins as f64 / trades.len() as f64
    }
}

/// Tally agreeing indicators over a set of trades
pub fn tally_indicators<'a>(trades: impl IntoIterator<Item = &'a TradeRecord>) -> BTreeMap<Indicator, IndicatorTally> {
    let mut tallies: BTreeMap<Indicator, IndicatorTally> = BTreeMap::new();
    for trade in trades {
        let sign = trade.position.direction.sign();
        for (indicator, polarity) in &trade.position.entry_signals.polarities {
            if !polarity.agrees_with(sign) {
                continue;
            }
            let tally = tallies.entry(*indicator).or_default();
            if trade.is_winner() {
                tally.wins += 1;
            } else {
                tally.losses += 1;
            }
        }
    }
    tallies
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::types::{AssetClass, Direction, Polarity, Position, PositionStatus, Regime, SignalVector};
    use chrono::Utc;

    pub(crate) fn record(win: bool, failure_type: FailureType, return_pct: f64) -> TradeRecord {
        let mut signals = SignalVector::default();
        signals.polarities.insert(Indicator::Rsi, Polarity::Bullish);
        signals.polarities.insert(Indicator::Macd, Polarity::Bearish);
        let now = Utc::now();
        TradeRecord {
            position: Position {
                id: crate::utils::helpers::generate_id(),
                symbol: "EURUSD".to_string(),
                asset_class: AssetClass::Forex,
                direction: Direction::Long,
                size_fraction: 0.05,
                leverage: 10,
                stop_pct: 0.005,
                entry_price: 1.1,
                stop_price: 1.0945,
                target_price: 1.111,
                entry_time: now,
                status: if win { PositionStatus::Win } else { PositionStatus::Loss },
                entry_signals: signals,
                entry_volatility: 0.005,
                entry_atr_pct: 0.005,
                regime: Regime::Neutral,
                correlation_limited: false,
            },
            exit_price: 1.1,
            exit_time: now,
            exit_volatility: 0.005,
            exit_atr_pct: 0.005,
            return_pct,
            hold_hours: 3.0,
            failure_type,
            attribution_reasons: vec![],
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = TradeHistory::new(3);
        for i in 0..5 {
            let evicted = history.push(record(true, FailureType::None, 0.01 * i as f64));
            assert_eq!(evicted.is_some(), i >= 3);
        }
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_sharpe_calculation() {
        let returns = vec![0.01, 0.02, -0.005, 0.015, 0.01];
        let sharpe = TradeHistory::calculate_sharpe(&returns);
        assert!(sharpe > 0.0);
    }

    #[test]
    fn test_max_drawdown() {
        let dd = TradeHistory::calculate_max_drawdown(&[0.1, -0.05]);
        assert!(dd > 0.0);
    }

    #[test]
    fn test_news_excluded_from_tallies_and_window() {
        let mut history = TradeHistory::new(100);
        history.push(record(true, FailureType::None, 0.01));
        history.push(record(false, FailureType::News, -0.02));
        history.push(record(false, FailureType::Logic, -0.01));

        assert_eq!(history.attributable_window(100).len(), 2);
        let tallies = history.indicator_tallies();
        assert_eq!(tallies[&Indicator::Rsi], IndicatorTally { wins: 1, losses: 1 });
        assert!(!tallies.contains_key(&Indicator::Macd));
        assert_eq!(history.attributable_win_rate(), Some(0.5));
    }

    #[test]
    fn test_metrics() {
        let mut history = TradeHistory::new(100);
        history.push(record(true, FailureType::None, 0.02));
        history.push(record(false, FailureType::Mixed, -0.01));
        history.push(record(false, FailureType::News, -0.01));
        let m = history.metrics();
        assert_eq!(m.total_trades, 3);
        assert_eq!(m.winning_trades, 1);
        assert!((m.profit_factor.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(m.current_streak, -2);
        assert_eq!(m.news_failures, 1);
        assert_eq!(m.mixed_failures, 1);
    }

    #[test]
    fn test_profit_factor_undefined_without_losses() {
        let mut history = TradeHistory::new(100);
        history.push(record(true, FailureType::None, 0.02));
        history.push(record(true, FailureType::None, 0.01));
        let m = history.metrics();
        assert_eq!(m.profit_factor, None);
        assert_eq!(m.gross_loss, 0.0);

        let json = serde_json::to_value(&m).unwrap();
        assert!(json["profit_factor"].is_null());
        let restored: PerformanceMetrics = serde_json::from_value(json).unwrap();
        assert_eq!(restored.profit_factor, None);

        assert_eq!(PerformanceMetrics::default().profit_factor, None);
    }
}
