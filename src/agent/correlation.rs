//! Correlation Exposure Limiter
//!
//! Owns the open-position ledger and gates new candidates on correlated exposure:
//! - Currency-leg heuristic correlation, with configured overrides
//! - Weighted exposure over significantly correlated open positions
//! - Resize down to the remaining budget, or reject below the minimum size

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::config::CorrelationOverride;
use crate::params::ParameterSet;
use crate::utils::types::Position;

/// Open positions keyed by symbol
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionLedger {
    positions: BTreeMap<String, Position>,
}

impl PositionLedger {
    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
    }

    pub fn remove(&mut self, symbol: &str) -> Option<Position> {
        self.positions.remove(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Pairwise correlation source. Implementations must be deterministic and symmetric.
pub trait CorrelationModel: Send + Sync {
    fn correlation(&self, a: &str, b: &str) -> f64;
}

/// Currency-leg heuristic with explicit overrides
#[derive(Debug, Clone, Default)]
pub struct HeuristicCorrelation {
    overrides: HashMap<(String, String), f64>,
}

impl HeuristicCorrelation {
    pub fn new(overrides: &[CorrelationOverride]) -> Self {
        let overrides = overrides
            .iter()
            .map(|o| (Self::key(&o.a, &o.b), o.correlation))
            .collect();
        Self { overrides }
    }

    fn key(a: &str, b: &str) -> (String, String) {
        let (a, b) = (a.to_uppercase(), b.to_uppercase());
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Split a six-letter pair into (base, quote). Other symbols have no quote leg.
    fn legs(symbol: &str) -> (String, String) {
        let s: String = symbol
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_uppercase();
        if s.len() == 6 {
            (s[..3].to_string(), s[3..].to_string())
        } else {
            (s, String::new())
        }
    }

    fn heuristic(a: &str, b: &str) -> f64 {
        let (base_a, quote_a) = Self::legs(a);
        let (base_b, quote_b) = Self::legs(b);
        if base_a == base_b && quote_a == quote_b {
            return 1.0;
        }
        let same = |x: &str, y: &str| !x.is_empty() && x == y;
        if same(&base_a, &base_b) || same(&quote_a, &quote_b) {
            0.8
        } else if same(&base_a, &quote_b) || same(&quote_a, &base_b) {
            -0.8
        } else {
            0.2
        }
    }
}

impl CorrelationModel for HeuristicCorrelation {
    fn correlation(&self, a: &str, b: &str) -> f64 {
        match self.overrides.get(&Self::key(a, b)) {
            Some(c) => *c,
            None => Self::heuristic(a, b),
        }
    }
}

/// Outcome of the exposure gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrelationDecision {
    Accept { size: f64, exposure: f64 },
    Resize { size: f64, exposure: f64 },
    Reject { exposure: f64, cap: f64 },
}

/// Σ |c| × size over open positions with |c| above the threshold
pub fn weighted_exposure(
    symbol: &str,
    ledger: &PositionLedger,
    model: &dyn CorrelationModel,
    threshold: f64,
) -> f64 {
    ledger
        .iter()
        .filter_map(|p| {
            let c = model.correlation(symbol, &p.symbol).abs();
            (c > threshold).then(|| c * p.size_fraction)
        })
        .sum()
}

/// Gate a candidate of `size` against the ledger
pub fn check_exposure(
    symbol: &str,
    size: f64,
    ledger: &PositionLedger,
    model: &dyn CorrelationModel,
    params: &ParameterSet,
    min_size: f64,
) -> CorrelationDecision {
    let exposure = weighted_exposure(symbol, ledger, model, params.correlation_threshold());
    let cap = size * params.max_correlation_exposure();

    if exposure + size <= cap {
        return CorrelationDecision::Accept { size, exposure };
    }

    let allowed = cap - exposure;
    debug!(
        "{} correlated exposure {:.4} + {:.4} exceeds cap {:.4}",
        symbol, exposure, size, cap
    );
    if allowed >= min_size {
        CorrelationDecision::Resize { size: allowed.min(size), exposure }
    } else {
        CorrelationDecision::Reject { exposure, cap }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::{AssetClass, Direction, PositionStatus, SignalVector};

    fn position(symbol: &str, size: f64) -> Position {
        Position {
            id: symbol.to_string(),
            symbol: symbol.to_string(),
            asset_class: AssetClass::Forex,
            direction: Direction::Long,
            size_fraction: size,
            leverage: 10,
            stop_pct: 0.005,
            entry_price: 1.0,
            stop_price: 0.995,
            target_price: 1.01,
            entry_time: chrono::Utc::now(),
            status: PositionStatus::Open,
            entry_signals: SignalVector::default(),
            entry_volatility: 0.005,
            entry_atr_pct: 0.005,
            regime: Default::default(),
            correlation_limited: false,
        }
    }

    #[test]
    fn test_heuristic_is_symmetric() {
        let model = HeuristicCorrelation::default();
        let symbols = ["EURUSD", "GBPUSD", "EURJPY", "USDJPY", "AUDCAD", "XAUUSD", "AAPL", "MSFT"];
        for a in symbols {
            for b in symbols {
                assert_eq!(model.correlation(a, b), model.correlation(b, a), "{} / {}", a, b);
            }
        }
    }

    #[test]
    fn test_heuristic_legs() {
        let model = HeuristicCorrelation::default();
        assert_eq!(model.correlation("EURUSD", "EURJPY"), 0.8);
        assert_eq!(model.correlation("EURUSD", "GBPUSD"), 0.8);
        assert_eq!(model.correlation("EURUSD", "USDJPY"), -0.8);
        assert_eq!(model.correlation("GBPUSD", "EURJPY"), 0.2);
        assert_eq!(model.correlation("AAPL", "MSFT"), 0.2);
        assert_eq!(model.correlation("EURUSD", "EURUSD"), 1.0);
    }

    #[test]
    fn test_override_takes_precedence_both_ways() {
        let model = HeuristicCorrelation::new(&[CorrelationOverride {
            a: "GBPUSD".to_string(),
            b: "eurjpy".to_string(),
            correlation: 0.8,
        }]);
        assert_eq!(model.correlation("EURJPY", "GBPUSD"), 0.8);
        assert_eq!(model.correlation("GBPUSD", "EURJPY"), 0.8);
    }

    #[test]
    fn test_uncorrelated_candidate_accepted() {
        let model = HeuristicCorrelation::default();
        let mut ledger = PositionLedger::default();
        ledger.insert(position("AUDCAD", 0.1));
        let decision = check_exposure("EURJPY", 0.05, &ledger, &model, &ParameterSet::default(), 0.01);
        assert_eq!(decision, CorrelationDecision::Accept { size: 0.05, exposure: 0.0 });
    }

    #[test]
    fn test_exhausted_budget_rejects() {
        let model = HeuristicCorrelation::default();
        let mut ledger = PositionLedger::default();
        ledger.insert(position("EURUSD", 0.2));
        ledger.insert(position("EURGBP", 0.2));
        let decision = check_exposure("EURJPY", 0.05, &ledger, &model, &ParameterSet::default(), 0.01);
        assert!(matches!(decision, CorrelationDecision::Reject { .. }));
    }

    #[test]
    fn test_exposure_grows_with_correlation() {
        let mut ledger = PositionLedger::default();
        ledger.insert(position("AAA", 0.1));
        let low = HeuristicCorrelation::new(&[CorrelationOverride { a: "AAA".into(), b: "BBB".into(), correlation: 0.6 }]);
        let high = HeuristicCorrelation::new(&[CorrelationOverride { a: "AAA".into(), b: "BBB".into(), correlation: -0.9 }]);
        let e_low = weighted_exposure("BBB", &ledger, &low, 0.5);
        let e_high = weighted_exposure("BBB", &ledger, &high, 0.5);
        assert!(e_high > e_low);
    }
}
