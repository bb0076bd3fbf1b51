//! Configuration module
//!
//! Handles loading and validation of the engine configuration. Every field has a
//! default, so an empty YAML document is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub leverage: LeverageConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub learner: LearnerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.fusion.expected_return_per_sentiment > 0.0,
            "expected_return_per_sentiment must be positive"
        );
        anyhow::ensure!(
            self.fusion.min_rr > 0.0,
            "min_rr must be positive"
        );
        anyhow::ensure!(
            self.fusion.forced_fallback_edge > 0.0 && self.fusion.forced_fallback_edge.is_finite(),
            "forced_fallback_edge must be positive"
        );
        anyhow::ensure!(
            self.fusion.forex_atr_multiplier > 0.0 && self.fusion.default_atr_multiplier > 0.0,
            "ATR multipliers must be positive"
        );
        anyhow::ensure!(
            self.fusion.proximity_band > 0.0 && self.fusion.proximity_band < 0.5,
            "proximity_band must be between 0 and 0.5"
        );
        anyhow::ensure!(
            self.leverage.forex_ceiling >= 1 && self.leverage.default_ceiling >= 1,
            "leverage ceilings must be at least 1"
        );
        anyhow::ensure!(
            self.leverage.very_high_volatility >= self.leverage.high_volatility,
            "very_high_volatility must not be below high_volatility"
        );
        anyhow::ensure!(
            self.sizing.min_position_size > 0.0
                && self.sizing.min_position_size <= self.sizing.max_position_size
                && self.sizing.max_position_size <= 1.0,
            "position size bounds must satisfy 0 < min <= max <= 1"
        );
        anyhow::ensure!(
            self.risk.daily_risk_limit > 0.0,
            "daily_risk_limit must be positive"
        );
        for o in &self.risk.correlation_overrides {
            anyhow::ensure!(
                (-1.0..=1.0).contains(&o.correlation),
                "correlation override {}/{} must be within [-1, 1]",
                o.a,
                o.b
            );
        }
        anyhow::ensure!(
            self.regime.history_capacity > 0,
            "regime history_capacity must be positive"
        );
        anyhow::ensure!(
            self.attribution.low_agreement < self.attribution.high_agreement,
            "low_agreement must be below high_agreement"
        );
        anyhow::ensure!(
            self.learner.min_samples > 0 && self.learner.min_samples <= self.learner.window,
            "learner min_samples must be within (0, window]"
        );
        anyhow::ensure!(
            self.storage.trade_history_capacity > 0 && self.storage.parameter_history_capacity > 0,
            "storage capacities must be positive"
        );
        Ok(())
    }
}

/// Signal fusion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Expected move for a full +1.0 sentiment
    #[serde(default = "default_expected_return_per_sentiment")]
    pub expected_return_per_sentiment: f64,
    /// Bonus per news item
    #[serde(default = "default_news_count_bonus")]
    pub news_count_bonus: f64,
    /// Cap on the total news bonus
    #[serde(default = "default_max_news_bonus")]
    pub max_news_bonus: f64,
    /// Relative distance that counts as "near" support or resistance
    #[serde(default = "default_proximity_band")]
    pub proximity_band: f64,
    #[serde(default = "default_resistance_multiplier")]
    pub resistance_multiplier: f64,
    #[serde(default = "default_support_multiplier")]
    pub support_multiplier: f64,
    /// Relative distance that counts as "near" a round-number level
    #[serde(default = "default_psych_band")]
    pub psych_band: f64,
    #[serde(default = "default_psych_multiplier")]
    pub psych_multiplier: f64,
    /// Lower bound on the (2 - w) dampening factor
    #[serde(default = "default_min_dampening")]
    pub min_dampening: f64,
    #[serde(default = "default_forex_atr_multiplier")]
    pub forex_atr_multiplier: f64,
    #[serde(default = "default_atr_multiplier")]
    pub default_atr_multiplier: f64,
    /// Reward-to-risk floor
    #[serde(default = "default_min_rr")]
    pub min_rr: f64,
    #[serde(default = "default_min_agreeing_votes")]
    pub min_agreeing_votes: usize,
    /// Indicators that must back a news-forced direction
    #[serde(default = "default_min_override_corroboration")]
    pub min_override_corroboration: usize,
    /// Edge assumed for a news-forced direction the sentiment does not back
    #[serde(default = "default_forced_fallback_edge")]
    pub forced_fallback_edge: f64,
    /// Scale sentiment returns by the active forex session
    #[serde(default)]
    pub session_adjustment: bool,
    #[serde(default)]
    pub session_multipliers: SessionMultipliers,
}

fn default_expected_return_per_sentiment() -> f64 { 0.004 }
fn default_news_count_bonus() -> f64 { 0.001 }
fn default_max_news_bonus() -> f64 { 0.004 }
fn default_proximity_band() -> f64 { 0.02 }
fn default_resistance_multiplier() -> f64 { 0.8 }
fn default_support_multiplier() -> f64 { 1.2 }
fn default_psych_band() -> f64 { 0.01 }
fn default_psych_multiplier() -> f64 { 1.1 }
fn default_min_dampening() -> f64 { 0.1 }
fn default_forex_atr_multiplier() -> f64 { 1.5 }
fn default_atr_multiplier() -> f64 { 1.0 }
fn default_min_rr() -> f64 { 2.0 }
fn default_min_agreeing_votes() -> usize { 3 }
fn default_min_override_corroboration() -> usize { 1 }
fn default_forced_fallback_edge() -> f64 { 0.001 }

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            expected_return_per_sentiment: default_expected_return_per_sentiment(),
            news_count_bonus: default_news_count_bonus(),
            max_news_bonus: default_max_news_bonus(),
            proximity_band: default_proximity_band(),
            resistance_multiplier: default_resistance_multiplier(),
            support_multiplier: default_support_multiplier(),
            psych_band: default_psych_band(),
            psych_multiplier: default_psych_multiplier(),
            min_dampening: default_min_dampening(),
            forex_atr_multiplier: default_forex_atr_multiplier(),
            default_atr_multiplier: default_atr_multiplier(),
            min_rr: default_min_rr(),
            min_agreeing_votes: default_min_agreeing_votes(),
            min_override_corroboration: default_min_override_corroboration(),
            forced_fallback_edge: default_forced_fallback_edge(),
            session_adjustment: false,
            session_multipliers: SessionMultipliers::default(),
        }
    }
}

/// Expected-return multipliers per forex session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMultipliers {
    #[serde(default = "default_active_session")]
    pub london: f64,
    #[serde(default = "default_active_session")]
    pub new_york: f64,
    #[serde(default = "default_one")]
    pub asia: f64,
    #[serde(default = "default_off_hours")]
    pub off_hours: f64,
    #[serde(default)]
    pub weekend: f64,
}

fn default_active_session() -> f64 { 1.2 }
fn default_off_hours() -> f64 { 0.9 }
fn default_one() -> f64 { 1.0 }

impl Default for SessionMultipliers {
    fn default() -> Self {
        Self {
            london: default_active_session(),
            new_york: default_active_session(),
            asia: default_one(),
            off_hours: default_off_hours(),
            weekend: 0.0,
        }
    }
}

/// Leverage recommender settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageConfig {
    /// Leverage per unit of reward-to-risk
    #[serde(default = "default_rr_multiplier")]
    pub rr_multiplier: f64,
    #[serde(default = "default_forex_ceiling")]
    pub forex_ceiling: u32,
    /// Ceiling for every non-forex asset class
    #[serde(default = "default_leverage_ceiling")]
    pub default_ceiling: u32,
    /// Annualized volatility above which the ceiling drops to `high_volatility_ceiling`
    #[serde(default = "default_high_volatility")]
    pub high_volatility: f64,
    #[serde(default = "default_high_volatility_ceiling")]
    pub high_volatility_ceiling: u32,
    #[serde(default = "default_very_high_volatility")]
    pub very_high_volatility: f64,
    #[serde(default = "default_very_high_volatility_ceiling")]
    pub very_high_volatility_ceiling: u32,
    #[serde(default = "default_high_rr_threshold")]
    pub high_rr_threshold: f64,
    #[serde(default = "default_high_rr_boost")]
    pub high_rr_boost: f64,
}

fn default_rr_multiplier() -> f64 { 10.0 }
fn default_forex_ceiling() -> u32 { 500 }
fn default_leverage_ceiling() -> u32 { 5 }
fn default_high_volatility() -> f64 { 1.0 }
fn default_high_volatility_ceiling() -> u32 { 50 }
fn default_very_high_volatility() -> f64 { 2.0 }
fn default_very_high_volatility_ceiling() -> u32 { 20 }
fn default_high_rr_threshold() -> f64 { 3.0 }
fn default_high_rr_boost() -> f64 { 1.2 }

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            rr_multiplier: default_rr_multiplier(),
            forex_ceiling: default_forex_ceiling(),
            default_ceiling: default_leverage_ceiling(),
            high_volatility: default_high_volatility(),
            high_volatility_ceiling: default_high_volatility_ceiling(),
            very_high_volatility: default_very_high_volatility(),
            very_high_volatility_ceiling: default_very_high_volatility_ceiling(),
            high_rr_threshold: default_high_rr_threshold(),
            high_rr_boost: default_high_rr_boost(),
        }
    }
}

/// Position sizing bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    #[serde(default = "default_min_position_size")]
    pub min_position_size: f64,
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    /// Confidence attached to the history-based win rate when no classifier estimate is supplied
    #[serde(default = "default_history_confidence")]
    pub history_confidence: f64,
}

fn default_min_position_size() -> f64 { 0.01 }
fn default_max_position_size() -> f64 { 0.25 }
fn default_history_confidence() -> f64 { 0.5 }

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_position_size: default_min_position_size(),
            max_position_size: default_max_position_size(),
            history_confidence: default_history_confidence(),
        }
    }
}

/// Portfolio risk limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Cap on the daily sum of stop_pct x leverage. The 0.01 default admits no leveraged forex plan.
    #[serde(default = "default_daily_risk_limit")]
    pub daily_risk_limit: f64,
    /// Days of risk-ledger history kept
    #[serde(default = "default_ledger_retention_days")]
    pub ledger_retention_days: i64,
    /// Observed correlations that take precedence over the currency-leg heuristic
    #[serde(default)]
    pub correlation_overrides: Vec<CorrelationOverride>,
}

// A 2R forex plan at 20x leverage commits about 0.15, so at this value every forex
// candidate fails the budget. config.sample.yaml raises it.
fn default_daily_risk_limit() -> f64 { 0.01 }
fn default_ledger_retention_days() -> i64 { 30 }

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_risk_limit: default_daily_risk_limit(),
            ledger_retention_days: default_ledger_retention_days(),
            correlation_overrides: Vec::new(),
        }
    }
}

/// Symmetric correlation between two symbols
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationOverride {
    pub a: String,
    pub b: String,
    pub correlation: f64,
}

/// Regime detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Volatility observations kept per symbol
    #[serde(default = "default_regime_history")]
    pub history_capacity: usize,
    /// Observations needed before the percentile is trusted
    #[serde(default = "default_regime_min_history")]
    pub min_history: usize,
}

fn default_regime_history() -> usize { 100 }
fn default_regime_min_history() -> usize { 10 }

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_regime_history(),
            min_history: default_regime_min_history(),
        }
    }
}

/// Failure attribution thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionConfig {
    /// Exit/entry volatility or ATR ratio that marks a shock
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: f64,
    #[serde(default = "default_extreme_volatility")]
    pub extreme_volatility: f64,
    #[serde(default = "default_elevated_volatility")]
    pub elevated_volatility: f64,
    #[serde(default = "default_quick_stop_hours")]
    pub quick_stop_hours: f64,
    /// Adverse move, in multiples of the ATR-implied move, that marks a shock
    #[serde(default = "default_shock_multiple")]
    pub shock_multiple: f64,
    /// Ratio above which exit volatility counts as elevated
    #[serde(default = "default_elevation_ratio")]
    pub elevation_ratio: f64,
    #[serde(default = "default_low_agreement")]
    pub low_agreement: f64,
    #[serde(default = "default_high_agreement")]
    pub high_agreement: f64,
}

fn default_spike_ratio() -> f64 { 2.0 }
fn default_extreme_volatility() -> f64 { 0.03 }
fn default_elevated_volatility() -> f64 { 0.015 }
fn default_quick_stop_hours() -> f64 { 2.0 }
fn default_shock_multiple() -> f64 { 5.0 }
fn default_elevation_ratio() -> f64 { 1.3 }
fn default_low_agreement() -> f64 { 0.3 }
fn default_high_agreement() -> f64 { 0.7 }

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            spike_ratio: default_spike_ratio(),
            extreme_volatility: default_extreme_volatility(),
            elevated_volatility: default_elevated_volatility(),
            quick_stop_hours: default_quick_stop_hours(),
            shock_multiple: default_shock_multiple(),
            elevation_ratio: default_elevation_ratio(),
            low_agreement: default_low_agreement(),
            high_agreement: default_high_agreement(),
        }
    }
}

/// Adaptive learner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Attributable trades required before any update
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Most recent trades considered
    #[serde(default = "default_window")]
    pub window: usize,
    /// Trades per regime required before its threshold moves
    #[serde(default = "default_min_regime_samples")]
    pub min_regime_samples: usize,
    /// Closed trades between automatic learning runs
    #[serde(default = "default_cadence")]
    pub cadence_closed_trades: usize,
}

fn default_true() -> bool { true }
fn default_min_samples() -> usize { 30 }
fn default_window() -> usize { 100 }
fn default_min_regime_samples() -> usize { 5 }
fn default_cadence() -> usize { 10 }

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_samples: default_min_samples(),
            window: default_window(),
            min_regime_samples: default_min_regime_samples(),
            cadence_closed_trades: default_cadence(),
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_trade_history_capacity")]
    pub trade_history_capacity: usize,
    #[serde(default = "default_parameter_history_capacity")]
    pub parameter_history_capacity: usize,
}

fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_trade_history_capacity() -> usize { 1000 }
fn default_parameter_history_capacity() -> usize { 100 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            trade_history_capacity: default_trade_history_capacity(),
            parameter_history_capacity: default_parameter_history_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub enable_metrics: bool,
}

fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            log_file: None,
            metrics_port: default_metrics_port(),
            enable_metrics: false,
        }
    }
}
