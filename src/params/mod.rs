//! Adaptive Parameter Set
//!
//! Every value the learner may recalibrate lives here:
//! - Current value, research default and declared bounds per parameter
//! - Monotonic version and timestamped snapshot history for audit and rollback
//! - Typed accessors used by fusion, sizing and regime detection
//!
//! Components never hold their own copies of these values; they receive a snapshot
//! per cycle from [`crate::state::SharedParameters`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

use crate::utils::types::Indicator;

/// Parameter names
pub mod names {
    pub const KELLY_FRACTION: &str = "kelly_fraction";
    pub const ADX_TRENDING: &str = "adx_trending_threshold";
    pub const ADX_RANGING: &str = "adx_ranging_threshold";
    pub const VOLATILITY_PERCENTILE: &str = "volatility_high_percentile";
    pub const VOLATILITY_THRESHOLD: &str = "volatility_threshold";
    pub const TREND_AGREEMENT_TRENDING: &str = "trend_agreement_trending";
    pub const TREND_AGREEMENT_RANGING: &str = "trend_agreement_ranging";
    pub const CORRELATION_THRESHOLD: &str = "correlation_threshold";
    pub const MAX_CORRELATION_EXPOSURE: &str = "max_correlation_exposure";
    pub const VOLATILE_SIZE_MULTIPLIER: &str = "volatile_size_multiplier";
    pub const VOLATILE_STOP_MULTIPLIER: &str = "volatile_stop_multiplier";
    pub const TRENDING_STOP_MULTIPLIER: &str = "trending_stop_multiplier";
    pub const TRENDING_BOOST: &str = "trending_boost";
    pub const RANGING_BOOST: &str = "ranging_boost";
    pub const ML_CONFIDENCE_FACTOR: &str = "ml_confidence_factor";
    pub const ML_CONFIDENCE_MIN: &str = "ml_confidence_min";
    pub const ML_CONFIDENCE_MAX: &str = "ml_confidence_max";
    pub const MIN_STOP_PCT: &str = "min_stop_pct";

    /// Name of an indicator's weight
    pub fn weight(indicator: crate::utils::types::Indicator) -> String {
        format!("weight.{}", indicator.as_str())
    }
}

/// Built-in table: (name, default, min, max)
const BUILTIN: &[(&str, f64, f64, f64)] = &[
    (names::KELLY_FRACTION, 0.5, 0.3, 0.7),
    (names::ADX_TRENDING, 25.0, 15.0, 35.0),
    (names::ADX_RANGING, 20.0, 10.0, 25.0),
    (names::VOLATILITY_PERCENTILE, 0.8, 0.6, 0.95),
    (names::VOLATILITY_THRESHOLD, 0.03, 0.01, 0.08),
    (names::TREND_AGREEMENT_TRENDING, 0.6, 0.4, 0.9),
    (names::TREND_AGREEMENT_RANGING, 0.4, 0.1, 0.6),
    (names::CORRELATION_THRESHOLD, 0.5, 0.3, 0.9),
    (names::MAX_CORRELATION_EXPOSURE, 2.0, 1.0, 4.0),
    (names::VOLATILE_SIZE_MULTIPLIER, 0.5, 0.3, 1.0),
    (names::VOLATILE_STOP_MULTIPLIER, 1.5, 1.0, 2.0),
    (names::TRENDING_STOP_MULTIPLIER, 0.9, 0.7, 1.0),
    (names::TRENDING_BOOST, 1.2, 1.0, 1.5),
    (names::RANGING_BOOST, 1.3, 1.0, 1.6),
    (names::ML_CONFIDENCE_FACTOR, 0.5, 0.0, 1.0),
    (names::ML_CONFIDENCE_MIN, 0.1, 0.05, 0.5),
    (names::ML_CONFIDENCE_MAX, 0.9, 0.5, 0.95),
    (names::MIN_STOP_PCT, 0.001, 0.0002, 0.005),
];

pub const WEIGHT_MIN: f64 = 1.0;
pub const WEIGHT_MAX: f64 = 3.0;

fn default_weight(indicator: Indicator) -> f64 {
    match indicator {
        Indicator::Ichimoku => 1.2,
        Indicator::Volume => 1.15,
        Indicator::Fvg | Indicator::Candle => 1.1,
        _ => 1.0,
    }
}

/// Parameter update errors
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter: {0}")]
    Unknown(String),
    #[error("non-finite value for {name}: {value}")]
    NonFinite { name: String, value: f64 },
}

/// A single bounded parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub value: f64,
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

impl Parameter {
    fn new(default: f64, min: f64, max: f64) -> Self {
        Self { value: default, default, min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Audit record of a published parameter set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    pub timestamp: DateTime<Utc>,
    pub version: u64,
    pub reason: String,
    pub sample_size: usize,
    pub win_rate: Option<f64>,
    pub values: BTreeMap<String, f64>,
}

/// Versioned set of adaptive parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
    entries: BTreeMap<String, Parameter>,
    history: VecDeque<ParamSnapshot>,
    #[serde(skip, default = "default_history_capacity")]
    history_capacity: usize,
}

fn default_history_capacity() -> usize { 100 }

impl Default for ParameterSet {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        for (name, default, min, max) in BUILTIN {
            entries.insert(name.to_string(), Parameter::new(*default, *min, *max));
        }
        for indicator in Indicator::ALL {
            entries.insert(
                names::weight(indicator),
                Parameter::new(default_weight(indicator), WEIGHT_MIN, WEIGHT_MAX),
            );
        }
        Self {
            version: 0,
            updated_at: None,
            entries,
            history: VecDeque::new(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl ParameterSet {
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
        self
    }

    /// Rebuild from a persisted document. The code-declared layout and bounds win:
    /// unknown names are dropped and stored values are clamped into bounds.
    pub fn merge_persisted(persisted: ParameterSet, history_capacity: usize) -> Self {
        let mut merged = Self::default();
        for (name, stored) in &persisted.entries {
            if let Some(entry) = merged.entries.get_mut(name) {
                if stored.value.is_finite() {
                    entry.value = stored.value.clamp(entry.min, entry.max);
                }
            }
        }
        merged.version = persisted.version;
        merged.updated_at = persisted.updated_at;
        merged.history = persisted.history;
        merged.with_history_capacity(history_capacity)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.get(name).map(|p| p.value)
    }

    pub fn entry(&self, name: &str) -> Option<&Parameter> {
        self.entries.get(name)
    }

    pub fn history(&self) -> &VecDeque<ParamSnapshot> {
        &self.history
    }

    /// Set a value, clamped into its bounds. Returns the stored value.
    pub fn set(&mut self, name: &str, value: f64) -> Result<f64, ParamError> {
        if !value.is_finite() {
            return Err(ParamError::NonFinite { name: name.to_string(), value });
        }
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ParamError::Unknown(name.to_string()))?;
        entry.value = value.clamp(entry.min, entry.max);
        Ok(entry.value)
    }

    /// Whether every value is finite and inside its bounds
    pub fn is_within_bounds(&self) -> bool {
        self.entries.values().all(|p| p.value.is_finite() && p.contains(p.value))
    }

    /// Current values by name
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.entries.iter().map(|(k, p)| (k.clone(), p.value)).collect()
    }

    /// Bump the version and append an audit snapshot
    pub fn record_snapshot(&mut self, reason: &str, sample_size: usize, win_rate: Option<f64>, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = Some(now);
        self.history.push_back(ParamSnapshot {
            timestamp: now,
            version: self.version,
            reason: reason.to_string(),
            sample_size,
            win_rate,
            values: self.values(),
        });
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    /// Put every value back to its default, keeping the audit trail
    pub fn reset_to_defaults(&mut self, now: DateTime<Utc>) {
        for entry in self.entries.values_mut() {
            entry.value = entry.default;
        }
        self.record_snapshot("reset_to_defaults", 0, None, now);
    }

    fn value(&self, name: &str) -> f64 {
        match self.entries.get(name) {
            Some(p) => p.value,
            None => BUILTIN
                .iter()
                .find(|(n, ..)| *n == name)
                .map(|(_, d, ..)| *d)
                .unwrap_or(0.0),
        }
    }

    pub fn kelly_fraction(&self) -> f64 { self.value(names::KELLY_FRACTION) }
    pub fn adx_trending_threshold(&self) -> f64 { self.value(names::ADX_TRENDING) }
    pub fn adx_ranging_threshold(&self) -> f64 { self.value(names::ADX_RANGING) }
    pub fn volatility_high_percentile(&self) -> f64 { self.value(names::VOLATILITY_PERCENTILE) }
    pub fn volatility_threshold(&self) -> f64 { self.value(names::VOLATILITY_THRESHOLD) }
    pub fn trend_agreement_trending(&self) -> f64 { self.value(names::TREND_AGREEMENT_TRENDING) }
    pub fn trend_agreement_ranging(&self) -> f64 { self.value(names::TREND_AGREEMENT_RANGING) }
    pub fn correlation_threshold(&self) -> f64 { self.value(names::CORRELATION_THRESHOLD) }
    pub fn max_correlation_exposure(&self) -> f64 { self.value(names::MAX_CORRELATION_EXPOSURE) }
    pub fn volatile_size_multiplier(&self) -> f64 { self.value(names::VOLATILE_SIZE_MULTIPLIER) }
    pub fn volatile_stop_multiplier(&self) -> f64 { self.value(names::VOLATILE_STOP_MULTIPLIER) }
    pub fn trending_stop_multiplier(&self) -> f64 { self.value(names::TRENDING_STOP_MULTIPLIER) }
    pub fn trending_boost(&self) -> f64 { self.value(names::TRENDING_BOOST) }
    pub fn ranging_boost(&self) -> f64 { self.value(names::RANGING_BOOST) }
    pub fn ml_confidence_factor(&self) -> f64 { self.value(names::ML_CONFIDENCE_FACTOR) }
    pub fn ml_confidence_min(&self) -> f64 { self.value(names::ML_CONFIDENCE_MIN) }
    pub fn ml_confidence_max(&self) -> f64 { self.value(names::ML_CONFIDENCE_MAX) }
    pub fn min_stop_pct(&self) -> f64 { self.value(names::MIN_STOP_PCT) }

    pub fn indicator_weight(&self, indicator: Indicator) -> f64 {
        self.entries
            .get(&names::weight(indicator))
            .map(|p| p.value)
            .unwrap_or_else(|| default_weight(indicator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_within_bounds() {
        let params = ParameterSet::default();
        assert!(params.is_within_bounds());
        assert_eq!(params.kelly_fraction(), 0.5);
        assert_eq!(params.indicator_weight(Indicator::Ichimoku), 1.2);
        assert_eq!(params.indicator_weight(Indicator::Rsi), 1.0);
        assert_eq!(params.version, 0);
    }

    #[test]
    fn test_set_clamps_and_rejects() {
        let mut params = ParameterSet::default();
        assert_eq!(params.set(names::KELLY_FRACTION, 0.95), Ok(0.7));
        assert_eq!(params.set(names::KELLY_FRACTION, 0.1), Ok(0.3));
        assert!(matches!(
            params.set(names::KELLY_FRACTION, f64::NAN),
            Err(ParamError::NonFinite { .. })
        ));
        assert_eq!(
            params.set("no_such_param", 1.0),
            Err(ParamError::Unknown("no_such_param".to_string()))
        );
        assert_eq!(params.kelly_fraction(), 0.3);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut params = ParameterSet::default().with_history_capacity(3);
        for _ in 0..5 {
            params.record_snapshot("test", 0, None, Utc::now());
        }
        assert_eq!(params.history().len(), 3);
        assert_eq!(params.version, 5);
        assert_eq!(params.history().back().unwrap().version, 5);
    }

    #[test]
    fn test_merge_persisted_clamps_and_drops_unknown() {
        let mut stored = ParameterSet::default();
        stored.entries.get_mut(names::ADX_TRENDING).unwrap().value = 99.0;
        stored.entries.insert("legacy_knob".to_string(), Parameter::new(1.0, 0.0, 2.0));
        stored.version = 7;

        let merged = ParameterSet::merge_persisted(stored, 100);
        assert_eq!(merged.adx_trending_threshold(), 35.0);
        assert!(merged.get("legacy_knob").is_none());
        assert_eq!(merged.version, 7);
    }

    #[test]
    fn test_reset_to_defaults() {
        let mut params = ParameterSet::default();
        params.set(names::MIN_STOP_PCT, 0.003).unwrap();
        params.reset_to_defaults(Utc::now());
        assert_eq!(params.min_stop_pct(), 0.001);
        assert_eq!(params.history().back().unwrap().reason, "reset_to_defaults");
    }
}
