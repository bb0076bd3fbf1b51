//! Parameter Learner
//!
//! Recalibrates the adaptive parameter set from attributable trade outcomes:
//! - Kelly fraction from realized win rate and payoff
//! - Regime thresholds from per-regime win rates
//! - Volatile-regime sizing, correlation threshold and stop floor
//! - Indicator weights from per-indicator agreeing win rates
//!
//! Every change is staged on a copy of the current set. The caller publishes the
//! staged set only when the whole run succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::agentic::performance_db::tally_indicators;
use crate::config::LearnerConfig;
use crate::params::{names, ParamError, ParameterSet, WEIGHT_MIN};
use crate::utils::types::{Indicator, Regime, TradeRecord};

const KELLY_RETENTION: f64 = 0.8;
const KELLY_LEARNING_RATE: f64 = 0.2;
/// Optimal Kelly is halved before blending
const KELLY_SAFETY: f64 = 0.5;

const POOR_WIN_RATE: f64 = 0.4;
const GOOD_WIN_RATE: f64 = 0.6;

const ADX_STEP: f64 = 1.0;
const PERCENTILE_STEP: f64 = 0.02;
const VOLATILE_LOSS_RATE: f64 = 0.6;
const VOLATILE_SIZE_STEP: f64 = 0.05;
const VOLATILE_STOP_STEP: f64 = 0.1;
const CORRELATION_LOSS_SHARE: f64 = 0.2;
const CORRELATION_STEP: f64 = 0.05;
const LOW_OVERALL_WIN_RATE: f64 = 0.3;
const MIN_STOP_DECAY: f64 = 0.9;
const WEIGHT_UP: f64 = 1.1;
const WEIGHT_DOWN: f64 = 0.9;

/// Learning errors. Any error leaves the published parameters untouched.
#[derive(Debug, Error, PartialEq)]
pub enum LearnError {
    #[error("non-finite value computed for {name}: {value}")]
    NonFinite { name: String, value: f64 },
    #[error("parameter update failed: {0}")]
    Param(#[from] ParamError),
    #[error("staged parameters out of bounds")]
    OutOfBounds,
    #[error("parameter set was replaced while learning")]
    Superseded,
}

/// A single recalibrated value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamChange {
    pub name: String,
    pub old: f64,
    pub new: f64,
}

/// Result of a learning run
#[derive(Debug, Clone, PartialEq)]
pub enum LearnOutcome {
    /// Not enough attributable trades
    Skipped { samples: usize, required: usize },
    /// Enough data, but nothing moved
    Unchanged { samples: usize, win_rate: f64 },
    /// Staged set with a recorded snapshot, ready to publish
    Updated {
        params: Box<ParameterSet>,
        changes: Vec<ParamChange>,
        samples: usize,
        win_rate: f64,
    },
}

/// Rule-based parameter learner
#[derive(Debug, Clone, Default)]
pub struct ParameterLearner {
    config: LearnerConfig,
}

impl ParameterLearner {
    pub fn new(config: LearnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Stage updates from attributable records (oldest first, news already excluded)
    pub fn learn(
        &self,
        records: &[TradeRecord],
        current: &ParameterSet,
        now: DateTime<Utc>,
    ) -> Result<LearnOutcome, LearnError> {
        let samples = records.len();
        if samples < self.config.min_samples {
            debug!("Learner skipped: {} of {} samples", samples, self.config.min_samples);
            return Ok(LearnOutcome::Skipped { samples, required: self.config.min_samples });
        }

        let mut staged = current.clone();
        let mut changes = Vec::new();

        let wins: Vec<f64> = records.iter().filter(|r| r.is_winner()).map(|r| r.return_pct).collect();
        let losses: Vec<f64> = records.iter().filter(|r| !r.is_winner()).map(|r| r.return_pct.abs()).collect();
        let win_rate = wins.len() as f64 / samples as f64;

        self.learn_kelly(&mut staged, &mut changes, win_rate, &wins, &losses)?;
        self.learn_regimes(&mut staged, &mut changes, records)?;
        self.learn_correlation(&mut staged, &mut changes, records)?;

        if win_rate < LOW_OVERALL_WIN_RATE {
            let value = staged.min_stop_pct() * MIN_STOP_DECAY;
            stage(&mut staged, &mut changes, names::MIN_STOP_PCT, value)?;
        }

        self.learn_weights(&mut staged, &mut changes, records)?;

        if !staged.is_within_bounds() {
            return Err(LearnError::OutOfBounds);
        }

        if changes.is_empty() {
            info!("Learner ran on {} trades (win rate {:.2}): no changes", samples, win_rate);
            return Ok(LearnOutcome::Unchanged { samples, win_rate });
        }

        let reason = format!("learned from {} trades", samples);
        staged.record_snapshot(&reason, samples, Some(win_rate), now);
        info!(
            "Learner staged {} changes from {} trades (win rate {:.2}), version {}",
            changes.len(),
            samples,
            win_rate,
            staged.version
        );

        Ok(LearnOutcome::Updated {
            params: Box::new(staged),
            changes,
            samples,
            win_rate,
        })
    }

    fn learn_kelly(
        &self,
        staged: &mut ParameterSet,
        changes: &mut Vec<ParamChange>,
        win_rate: f64,
        wins: &[f64],
        losses: &[f64],
    ) -> Result<(), LearnError> {
        if wins.is_empty() || losses.is_empty() {
            return Ok(());
        }
        let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
        let avg_loss = losses.iter().sum::<f64>() / losses.len() as f64;
        if avg_loss <= 0.0 {
            return Ok(());
        }

        let payoff = avg_win / avg_loss;
        if payoff <= 0.0 {
            return Ok(());
        }
        let optimal = (win_rate * payoff - (1.0 - win_rate)) / payoff;
        let value = staged.kelly_fraction() * KELLY_RETENTION + optimal * KELLY_SAFETY * KELLY_LEARNING_RATE;
        debug!("Kelly: win rate {:.2}, payoff {:.2}, optimal {:.3}", win_rate, payoff, optimal);
        stage(staged, changes, names::KELLY_FRACTION, value)
    }

    fn learn_regimes(
        &self,
        staged: &mut ParameterSet,
        changes: &mut Vec<ParamChange>,
        records: &[TradeRecord],
    ) -> Result<(), LearnError> {
        let mut by_regime: HashMap<Regime, (usize, usize)> = HashMap::new();
        for record in records {
            let entry = by_regime.entry(record.position.regime).or_default();
            entry.0 += 1;
            if record.is_winner() {
                entry.1 += 1;
            }
        }

        for (regime, (total, won)) in by_regime {
            if total <= self.config.min_regime_samples {
                continue;
            }
            let rate = won as f64 / total as f64;
            let poor = rate < POOR_WIN_RATE;
            let good = rate > GOOD_WIN_RATE;
            if !poor && !good {
                continue;
            }
            let step = if poor { 1.0 } else { -1.0 };

            match regime {
                Regime::Trending => {
                    let value = staged.adx_trending_threshold() + step * ADX_STEP;
                    stage(staged, changes, names::ADX_TRENDING, value)?;
                }
                Regime::Ranging => {
                    let value = staged.adx_ranging_threshold() - step * ADX_STEP;
                    stage(staged, changes, names::ADX_RANGING, value)?;
                }
                Regime::Volatile => {
                    let value = staged.volatility_high_percentile() + step * PERCENTILE_STEP;
                    stage(staged, changes, names::VOLATILITY_PERCENTILE, value)?;

                    if 1.0 - rate > VOLATILE_LOSS_RATE {
                        let size = staged.volatile_size_multiplier() - VOLATILE_SIZE_STEP;
                        stage(staged, changes, names::VOLATILE_SIZE_MULTIPLIER, size)?;
                        let stop = staged.volatile_stop_multiplier() + VOLATILE_STOP_STEP;
                        stage(staged, changes, names::VOLATILE_STOP_MULTIPLIER, stop)?;
                    }
                }
                Regime::Neutral => {}
            }
        }
        Ok(())
    }

    fn learn_correlation(
        &self,
        staged: &mut ParameterSet,
        changes: &mut Vec<ParamChange>,
        records: &[TradeRecord],
    ) -> Result<(), LearnError> {
        let limited_losses = records
            .iter()
            .filter(|r| r.position.correlation_limited && !r.is_winner())
            .count();
        if limited_losses as f64 > CORRELATION_LOSS_SHARE * records.len() as f64 {
            let value = staged.correlation_threshold() - CORRELATION_STEP;
            stage(staged, changes, names::CORRELATION_THRESHOLD, value)?;
        }
        Ok(())
    }

    fn learn_weights(
        &self,
        staged: &mut ParameterSet,
        changes: &mut Vec<ParamChange>,
        records: &[TradeRecord],
    ) -> Result<(), LearnError> {
        let tallies = tally_indicators(records);
        for indicator in Indicator::ALL {
            let Some(tally) = tallies.get(&indicator) else { continue };
            if (tally.total() as usize) < self.config.min_regime_samples {
                continue;
            }
            let Some(rate) = tally.win_rate() else { continue };
            let factor = if rate > GOOD_WIN_RATE {
                WEIGHT_UP
            } else if rate < POOR_WIN_RATE {
                WEIGHT_DOWN
            } else {
                continue;
            };
            let value = (staged.indicator_weight(indicator) * factor).max(WEIGHT_MIN);
            stage(staged, changes, &names::weight(indicator), value)?;
        }
        Ok(())
    }
}

/// Set a value on the staged copy and note it when it moved
fn stage(
    staged: &mut ParameterSet,
    changes: &mut Vec<ParamChange>,
    name: &str,
    value: f64,
) -> Result<(), LearnError> {
    if !value.is_finite() {
        return Err(LearnError::NonFinite { name: name.to_string(), value });
    }
    let old = staged.get(name).ok_or_else(|| ParamError::Unknown(name.to_string()))?;
    let new = staged.set(name, value)?;
    if (new - old).abs() > f64::EPSILON {
        debug!("{}: {:.5} -> {:.5}", name, old, new);
        changes.push(ParamChange { name: name.to_string(), old, new });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentic::performance_db::tests::record;
    use crate::utils::types::FailureType;

    fn records(wins: usize, losses: usize) -> Vec<TradeRecord> {
        let mut out = Vec::new();
        for _ in 0..wins {
            out.push(record(true, FailureType::None, 0.02));
        }
        for _ in 0..losses {
            out.push(record(false, FailureType::Logic, -0.01));
        }
        out
    }

    #[test]
    fn test_too_few_samples_skips() {
        let learner = ParameterLearner::default();
        let outcome = learner.learn(&records(10, 10), &ParameterSet::default(), Utc::now()).unwrap();
        assert_eq!(outcome, LearnOutcome::Skipped { samples: 20, required: 30 });
    }

    #[test]
    fn test_kelly_blend() {
        let learner = ParameterLearner::default();
        // p = 0.6, b = 2: optimal = (1.2 - 0.4) / 2 = 0.4
        // new = 0.5 * 0.8 + 0.4 * 0.5 * 0.2 = 0.44
        let outcome = learner.learn(&records(24, 16), &ParameterSet::default(), Utc::now()).unwrap();
        let LearnOutcome::Updated { params, changes, win_rate, .. } = outcome else {
            panic!("expected update");
        };
        assert!((win_rate - 0.6).abs() < 1e-12);
        assert!((params.kelly_fraction() - 0.44).abs() < 1e-9);
        assert!(changes.iter().any(|c| c.name == names::KELLY_FRACTION));
        assert_eq!(params.version, 1);
        assert_eq!(params.history().len(), 1);
    }

    #[test]
    fn test_weights_never_fall_below_floor() {
        let learner = ParameterLearner::default();
        // Rsi agrees on every trade and wins 20%
        let outcome = learner.learn(&records(8, 32), &ParameterSet::default(), Utc::now()).unwrap();
        let LearnOutcome::Updated { params, .. } = outcome else {
            panic!("expected update");
        };
        assert_eq!(params.indicator_weight(Indicator::Rsi), WEIGHT_MIN);
        assert!(params.is_within_bounds());
    }

    #[test]
    fn test_good_indicator_weight_rises() {
        let learner = ParameterLearner::default();
        let outcome = learner.learn(&records(28, 12), &ParameterSet::default(), Utc::now()).unwrap();
        let LearnOutcome::Updated { params, .. } = outcome else {
            panic!("expected update");
        };
        assert!((params.indicator_weight(Indicator::Rsi) - 1.1).abs() < 1e-9);
        // Macd is bearish on long trades and never counted
        assert_eq!(params.indicator_weight(Indicator::Macd), 1.0);
    }

    #[test]
    fn test_poor_volatile_regime_tightens() {
        let learner = ParameterLearner::default();
        let mut recs = records(20, 10);
        for _ in 0..10 {
            let mut r = record(false, FailureType::Mixed, -0.01);
            r.position.regime = Regime::Volatile;
            recs.push(r);
        }
        let current = ParameterSet::default();
        let LearnOutcome::Updated { params, .. } = learner.learn(&recs, &current, Utc::now()).unwrap() else {
            panic!("expected update");
        };
        assert!((params.volatility_high_percentile() - 0.82).abs() < 1e-9);
        assert!((params.volatile_size_multiplier() - 0.45).abs() < 1e-9);
        assert!((params.volatile_stop_multiplier() - 1.6).abs() < 1e-9);
        // The input set is never mutated
        assert_eq!(current.volatility_high_percentile(), 0.8);
    }

    #[test]
    fn test_low_win_rate_lowers_min_stop() {
        let learner = ParameterLearner::default();
        let LearnOutcome::Updated { params, .. } = learner.learn(&records(5, 30), &ParameterSet::default(), Utc::now()).unwrap() else {
            panic!("expected update");
        };
        assert!((params.min_stop_pct() - 0.0009).abs() < 1e-12);
    }
}
