//! Failure Attribution
//!
//! Tags each closed losing trade with a cause:
//! - News: volatility or ATR shock between entry and exit, or an outsized adverse move
//! - Logic: the entry signals themselves were weak, or strong in a calm market
//! - Mixed: everything else
//!
//! News-driven losses are excluded from learning so one-off shocks do not
//! move the parameters.

use serde::{Deserialize, Serialize};

use crate::config::AttributionConfig;
use crate::utils::helpers::safe_div;
use crate::utils::types::{FailureType, Position, PositionStatus};

/// Exit-side readings for a closed position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitContext {
    pub return_pct: f64,
    pub hold_hours: f64,
    pub exit_volatility: f64,
    pub exit_atr_pct: f64,
}

/// Attribution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub failure_type: FailureType,
    pub reasons: Vec<String>,
    /// Share of entry indicators that agreed with the trade direction
    pub agreement: f64,
}

/// Rule-based failure classifier
#[derive(Debug, Clone, Default)]
pub struct FailureClassifier {
    config: AttributionConfig,
}

impl FailureClassifier {
    pub fn new(config: AttributionConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, position: &Position, exit: &ExitContext) -> Attribution {
        let cfg = &self.config;
        let agreement = position.entry_signals.agreement_with(position.direction);

        if position.status == PositionStatus::Win {
            return Attribution {
                failure_type: FailureType::None,
                reasons: vec!["Winning trade".to_string()],
                agreement,
            };
        }

        let vol_ratio = ratio(exit.exit_volatility, position.entry_volatility);
        let atr_ratio = ratio(exit.exit_atr_pct, position.entry_atr_pct);
        let adverse_move = exit.return_pct.abs();
        let expected_move = 2.0 * position.entry_atr_pct;

        let mut news_reasons = Vec::new();
        if vol_ratio > cfg.spike_ratio {
            news_reasons.push(format!("Volatility spiked {:.1}x during trade", vol_ratio));
        }
        if atr_ratio > cfg.spike_ratio {
            news_reasons.push(format!("ATR expanded {:.1}x during trade", atr_ratio));
        }
        if exit.exit_volatility > cfg.extreme_volatility {
            news_reasons.push(format!("Extreme exit volatility {:.4}", exit.exit_volatility));
        }
        if exit.hold_hours < cfg.quick_stop_hours && exit.exit_volatility > cfg.elevated_volatility {
            news_reasons.push(format!(
                "Stopped after {:.1}h in elevated volatility",
                exit.hold_hours
            ));
        }
        if expected_move > 0.0 && adverse_move > cfg.shock_multiple * expected_move {
            news_reasons.push(format!(
                "Adverse move {:.4} is {:.1}x the ATR-implied move",
                adverse_move,
                adverse_move / expected_move
            ));
        }
        if !news_reasons.is_empty() {
            return Attribution {
                failure_type: FailureType::News,
                reasons: news_reasons,
                agreement,
            };
        }

        let elevated = vol_ratio > cfg.elevation_ratio || exit.exit_volatility > cfg.elevated_volatility;
        if agreement < cfg.low_agreement {
            Attribution {
                failure_type: FailureType::Logic,
                reasons: vec![format!("Only {:.0}% of indicators agreed at entry", agreement * 100.0)],
                agreement,
            }
        } else if agreement >= cfg.high_agreement && !elevated {
            Attribution {
                failure_type: FailureType::Logic,
                reasons: vec![format!(
                    "{:.0}% indicator agreement failed in a calm market",
                    agreement * 100.0
                )],
                agreement,
            }
        } else {
            Attribution {
                failure_type: FailureType::Mixed,
                reasons: vec![format!(
                    "Agreement {:.0}% with volatility ratio {:.2}",
                    agreement * 100.0,
                    vol_ratio
                )],
                agreement,
            }
        }
    }
}

/// Exit/entry ratio, 1.0 when the entry reading is missing
fn ratio(exit: f64, entry: f64) -> f64 {
    if entry > 0.0 && exit.is_finite() {
        safe_div(exit, entry)
    } else {
        1.0
    }
}
