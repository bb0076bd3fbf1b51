//! Kelly-Criterion Position Sizer
//!
//! Fractional Kelly with:
//! - Win probability blended with classifier confidence
//! - Learned Kelly multiplier
//! - Hard clamp to the configured size bounds

use serde::{Deserialize, Serialize};

use crate::config::SizingConfig;
use crate::params::ParameterSet;
use crate::utils::types::WinEstimate;

/// Sizing result with the inputs that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellySizing {
    /// Blended, clamped win probability
    pub win_probability: f64,
    pub payoff_ratio: f64,
    /// Unscaled Kelly fraction, may be negative
    pub full_kelly: f64,
    pub size_fraction: f64,
    /// Inputs were unusable and the minimum size was returned
    pub degenerate: bool,
}

/// Confidence-weighted probability: p × ((1 − f) + confidence × f), clamped
pub fn blend_probability(estimate: &WinEstimate, params: &ParameterSet) -> f64 {
    let factor = params.ml_confidence_factor();
    let confidence = if estimate.confidence.is_finite() { estimate.confidence.clamp(0.0, 1.0) } else { 0.0 };
    let p = estimate.probability * ((1.0 - factor) + confidence * factor);
    let (lo, hi) = (params.ml_confidence_min(), params.ml_confidence_max());
    p.clamp(lo.min(hi), hi.max(lo))
}

/// Size a position as a capital fraction. Never returns less than the minimum size.
pub fn size_position(
    estimate: &WinEstimate,
    payoff_ratio: f64,
    params: &ParameterSet,
    sizing: &SizingConfig,
) -> KellySizing {
    let min = sizing.min_position_size;
    let max = sizing.max_position_size;

    let degenerate = !payoff_ratio.is_finite()
        || payoff_ratio <= 0.0
        || !estimate.probability.is_finite()
        || estimate.probability <= 0.0;
    if degenerate {
        return KellySizing {
            win_probability: 0.0,
            payoff_ratio,
            full_kelly: 0.0,
            size_fraction: min,
            degenerate: true,
        };
    }

    let p = blend_probability(estimate, params);
    let q = 1.0 - p;
    let full_kelly = (p * payoff_ratio - q) / payoff_ratio;
    let size_fraction = (full_kelly * params.kelly_fraction()).clamp(min, max);

    KellySizing {
        win_probability: p,
        payoff_ratio,
        full_kelly,
        size_fraction,
        degenerate: false,
    }
}
