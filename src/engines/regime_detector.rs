//! Market Regime Detector
//!
//! Classifies each symbol's current behavior as trending, ranging, volatile or neutral:
//! - Trend strength from the ADX reading
//! - Directional agreement across trend-following indicators
//! - Volatility percentile against a per-symbol ring buffer
//! - Confidence scaled by distance past the triggering threshold
//!
//! All thresholds come from the parameter snapshot so the learner can move them.

use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::debug;

use crate::config::RegimeConfig;
use crate::params::ParameterSet;
use crate::utils::helpers::safe_div;
use crate::utils::types::{Indicator, IndicatorFamily, MarketSnapshot, Regime, RegimeReading, SignalVector};

/// Multipliers a regime applies to sizing, stops and indicator weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeAdjustment {
    pub size_multiplier: f64,
    pub stop_multiplier: f64,
    pub trend_boost: f64,
    pub mean_reversion_boost: f64,
}

impl RegimeAdjustment {
    pub const IDENTITY: RegimeAdjustment = RegimeAdjustment {
        size_multiplier: 1.0,
        stop_multiplier: 1.0,
        trend_boost: 1.0,
        mean_reversion_boost: 1.0,
    };

    pub fn for_reading(reading: &RegimeReading, params: &ParameterSet) -> Self {
        match reading.regime {
            Regime::Volatile => Self {
                size_multiplier: params.volatile_size_multiplier(),
                stop_multiplier: params.volatile_stop_multiplier(),
                ..Self::IDENTITY
            },
            Regime::Trending => Self {
                stop_multiplier: params.trending_stop_multiplier(),
                trend_boost: params.trending_boost(),
                ..Self::IDENTITY
            },
            Regime::Ranging => Self {
                mean_reversion_boost: params.ranging_boost(),
                ..Self::IDENTITY
            },
            Regime::Neutral => Self::IDENTITY,
        }
    }

    /// Extra weight for an indicator under this regime
    pub fn weight_boost(&self, indicator: Indicator) -> f64 {
        match indicator.family() {
            IndicatorFamily::TrendFollowing => self.trend_boost,
            IndicatorFamily::MeanReversion => self.mean_reversion_boost,
            IndicatorFamily::Confirmation => 1.0,
        }
    }
}

/// Regime detector with per-symbol volatility history
pub struct RegimeDetector {
    history: DashMap<String, VecDeque<f64>>,
    capacity: usize,
    min_history: usize,
}

impl RegimeDetector {
    pub fn new(config: &RegimeConfig) -> Self {
        Self {
            history: DashMap::new(),
            capacity: config.history_capacity.max(1),
            min_history: config.min_history,
        }
    }

    /// Classify, then record the observation in the symbol's history
    pub fn observe(
        &self,
        symbol: &str,
        snapshot: &MarketSnapshot,
        signals: &SignalVector,
        params: &ParameterSet,
    ) -> RegimeReading {
        let mut hist = self.history.entry(symbol.to_string()).or_default();
        let percentile = Self::volatility_percentile(&hist, snapshot.volatility_hourly, self.min_history);
        let reading = Self::classify(snapshot, signals, percentile, params);

        hist.push_back(snapshot.volatility_hourly);
        while hist.len() > self.capacity {
            hist.pop_front();
        }

        debug!(
            "{} regime {} (conf {:.2}, adx {:.1}, agree {:.2}, vol pct {:.2})",
            symbol,
            reading.regime.as_str(),
            reading.confidence,
            reading.trend_strength,
            reading.trend_agreement,
            reading.volatility_percentile
        );
        reading
    }

    /// Pure classification from readings
    pub fn classify(
        snapshot: &MarketSnapshot,
        signals: &SignalVector,
        volatility_percentile: f64,
        params: &ParameterSet,
    ) -> RegimeReading {
        let adx = snapshot.adx;
        let agreement = trend_agreement(signals);
        let vol = snapshot.volatility_hourly;

        let pct_cutoff = params.volatility_high_percentile();
        let vol_threshold = params.volatility_threshold();
        let adx_trending = params.adx_trending_threshold();
        let adx_ranging = params.adx_ranging_threshold();
        let agree_trending = params.trend_agreement_trending();
        let agree_ranging = params.trend_agreement_ranging();

        let (regime, excess) = if volatility_percentile > pct_cutoff || vol > vol_threshold {
            let pct_excess = safe_div(volatility_percentile - pct_cutoff, 1.0 - pct_cutoff);
            let abs_excess = safe_div(vol - vol_threshold, vol_threshold);
            (Regime::Volatile, pct_excess.max(abs_excess))
        } else if adx > adx_trending && agreement > agree_trending {
            let adx_excess = safe_div(adx - adx_trending, adx_trending);
            let agree_excess = safe_div(agreement - agree_trending, 1.0 - agree_trending);
            (Regime::Trending, (adx_excess + agree_excess) / 2.0)
        } else if adx < adx_ranging && agreement < agree_ranging {
            let adx_excess = safe_div(adx_ranging - adx, adx_ranging);
            let agree_excess = safe_div(agree_ranging - agreement, agree_ranging);
            (Regime::Ranging, (adx_excess + agree_excess) / 2.0)
        } else {
            (Regime::Neutral, 0.0)
        };

        RegimeReading {
            regime,
            confidence: (0.5 + 0.5 * excess.clamp(0.0, 1.0)).clamp(0.0, 1.0),
            trend_strength: adx,
            trend_agreement: agreement,
            volatility_percentile,
        }
    }

    /// Fraction of history strictly below the current volatility
    fn volatility_percentile(history: &VecDeque<f64>, current: f64, min_history: usize) -> f64 {
        if history.len() < min_history.max(1) {
            return 0.5;
        }
        let below = history.iter().filter(|v| **v < current).count();
        below as f64 / history.len() as f64
    }

    pub fn history_len(&self, symbol: &str) -> usize {
        self.history.get(symbol).map(|h| h.len()).unwrap_or(0)
    }
}

/// |sum of trend-following votes| / number of trend-following indicators
pub fn trend_agreement(signals: &SignalVector) -> f64 {
    let trend: Vec<Indicator> = Indicator::ALL
        .iter()
        .copied()
        .filter(|i| i.family() == IndicatorFamily::TrendFollowing)
        .collect();
    let sum: i32 = trend.iter().map(|i| signals.polarity(*i).sign() as i32).sum();
    safe_div(sum.abs() as f64, trend.len() as f64)
}
