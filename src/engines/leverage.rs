//! Leverage Recommender

use crate::config::LeverageConfig;
use crate::utils::types::AssetClass;

pub const HOURS_PER_YEAR: f64 = 24.0 * 365.0;

/// Annualize an hourly return volatility
pub fn annualized_volatility(hourly: f64) -> f64 {
    hourly * HOURS_PER_YEAR.sqrt()
}

/// Integer leverage from reward-to-risk, capped by asset class and volatility.
/// Degenerate inputs resolve to 1x.
pub fn recommend_leverage(rr: f64, annual_volatility: f64, asset_class: AssetClass, config: &LeverageConfig) -> u32 {
    if !rr.is_finite() || rr <= 0.0 {
        return 1;
    }

    let mut base = (rr * config.rr_multiplier).floor();
    if rr >= config.high_rr_threshold {
        base = (base * config.high_rr_boost).floor();
    }

    let mut ceiling = match asset_class {
        AssetClass::Forex => config.forex_ceiling,
        _ => config.default_ceiling,
    };
    // Unknown volatility is treated as the worst case
    if !annual_volatility.is_finite() || annual_volatility > config.very_high_volatility {
        ceiling = ceiling.min(config.very_high_volatility_ceiling);
    } else if annual_volatility > config.high_volatility {
        ceiling = ceiling.min(config.high_volatility_ceiling);
    }
    let ceiling = ceiling.max(1);

    base.clamp(1.0, ceiling as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_from_rr() {
        let cfg = LeverageConfig::default();
        assert_eq!(recommend_leverage(2.0, 0.3, AssetClass::Forex, &cfg), 20);
        assert_eq!(recommend_leverage(2.0, 0.3, AssetClass::Stock, &cfg), 5);
    }

    #[test]
    fn test_volatility_steps_down_ceiling() {
        let cfg = LeverageConfig::default();
        assert_eq!(recommend_leverage(10.0, 0.5, AssetClass::Forex, &cfg), 120);
        assert_eq!(recommend_leverage(10.0, 1.5, AssetClass::Forex, &cfg), 50);
        assert_eq!(recommend_leverage(10.0, 2.5, AssetClass::Forex, &cfg), 20);
        assert_eq!(recommend_leverage(10.0, f64::NAN, AssetClass::Forex, &cfg), 20);
    }

    #[test]
    fn test_high_rr_boost() {
        let cfg = LeverageConfig::default();
        // floor(3.0 * 10) = 30, boosted to 36
        assert_eq!(recommend_leverage(3.0, 0.2, AssetClass::Forex, &cfg), 36);
    }

    #[test]
    fn test_degenerate_rr_is_one() {
        let cfg = LeverageConfig::default();
        assert_eq!(recommend_leverage(0.0, 0.2, AssetClass::Forex, &cfg), 1);
        assert_eq!(recommend_leverage(-1.0, 0.2, AssetClass::Forex, &cfg), 1);
        assert_eq!(recommend_leverage(f64::NAN, 0.2, AssetClass::Forex, &cfg), 1);
        assert_eq!(recommend_leverage(0.05, 0.2, AssetClass::Forex, &cfg), 1);
    }

    #[test]
    fn test_annualized_volatility() {
        assert!((annualized_volatility(0.01) - 0.01 * 8760f64.sqrt()).abs() < 1e-12);
    }
}
