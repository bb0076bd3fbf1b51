//! Signal Fusion Engine
//!
//! Turns one symbol's signals into a draft trade plan:
//! - Sentiment-driven expected return with a saturating news bonus
//! - Support/resistance and round-number proximity multipliers
//! - Per-indicator adaptive weights, boosted by the current regime
//! - ATR-based stop with a learned floor and a reward-to-risk floor
//! - Direction from agreeing votes or a corroborated news override
//!
//! Fusion never fails: malformed inputs resolve to `flat`, and only an unusable
//! stop yields `None`.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::regime_detector::RegimeAdjustment;
use crate::config::FusionConfig;
use crate::params::ParameterSet;
use crate::utils::helpers::sign_or_zero;
use crate::utils::types::{AssetClass, Candidate, Direction, MarketSession, RegimeReading};

/// Fused but not yet sized plan
#[derive(Debug, Clone, PartialEq)]
pub struct DraftPlan {
    pub direction: Direction,
    /// Signed expected return
    pub expected_return_pct: f64,
    pub expected_profit_pct: f64,
    pub stop_pct: f64,
    pub rr: f64,
    /// Profit target was raised to meet the reward-to-risk floor
    pub rr_forced: bool,
    /// Indicators agreeing with the chosen direction
    pub agreeing_votes: usize,
    /// Direction came from the news-impact override
    pub forced_by_news: bool,
    pub reasons: Vec<String>,
}

impl DraftPlan {
    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::Flat
    }

    /// (stop, target) prices around an entry price
    pub fn price_levels(&self, entry: f64) -> (f64, f64) {
        match self.direction {
            Direction::Long => (entry * (1.0 - self.stop_pct), entry * (1.0 + self.expected_profit_pct)),
            Direction::Short => (entry * (1.0 + self.stop_pct), entry * (1.0 - self.expected_profit_pct)),
            Direction::Flat => (entry, entry),
        }
    }
}

/// Signal fusion engine
#[derive(Debug, Clone)]
pub struct SignalFusion {
    config: FusionConfig,
}

impl SignalFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Fuse a sanitized candidate under a regime reading and parameter snapshot
    pub fn fuse(
        &self,
        candidate: &Candidate,
        regime: &RegimeReading,
        params: &ParameterSet,
        now: DateTime<Utc>,
    ) -> Option<DraftPlan> {
        let cfg = &self.config;
        let signals = &candidate.signals;
        let snap = &candidate.snapshot;
        let mut reasons = Vec::new();

        let sentiment_sign = sign_or_zero(signals.sentiment);

        // 1. Sentiment and news
        let per_sentiment = cfg.expected_return_per_sentiment * self.session_multiplier(now);
        let news_bonus = (cfg.news_count_bonus * signals.news_count as f64).min(cfg.max_news_bonus);
        let mut expected_return = signals.sentiment * per_sentiment + news_bonus * sentiment_sign as f64;

        // 2. Proximity to levels
        let price = snap.price;
        if price > 0.0 {
            if snap.resistance > 0.0 && price > snap.resistance * (1.0 - cfg.proximity_band) {
                expected_return *= cfg.resistance_multiplier;
                reasons.push(format!("Near resistance {:.5}", snap.resistance));
            }
            if snap.support > 0.0 && price < snap.support * (1.0 + cfg.proximity_band) {
                expected_return *= cfg.support_multiplier;
                reasons.push(format!("Near support {:.5}", snap.support));
            }
            if snap.psych_level > 0.0 && (price - snap.psych_level).abs() / price < cfg.psych_band {
                expected_return *= cfg.psych_multiplier;
                reasons.push(format!("Near round level {:.5}", snap.psych_level));
            }
        }

        // 3. Indicator weights
        let adjustment = RegimeAdjustment::for_reading(regime, params);
        for (indicator, polarity) in &signals.polarities {
            let weight = params.indicator_weight(*indicator) * adjustment.weight_boost(*indicator);
            if polarity.agrees_with(sentiment_sign) {
                expected_return *= weight;
            } else if polarity.opposes(sentiment_sign) {
                expected_return *= (2.0 - weight).max(cfg.min_dampening);
            }
        }
        if !expected_return.is_finite() {
            expected_return = 0.0;
        }

        // 4. Stop and reward-to-risk
        let atr_multiplier = match candidate.asset_class {
            AssetClass::Forex => cfg.forex_atr_multiplier,
            _ => cfg.default_atr_multiplier,
        };
        let stop_pct = (atr_multiplier * snap.atr_pct * adjustment.stop_multiplier).max(params.min_stop_pct());
        if !stop_pct.is_finite() || stop_pct <= 0.0 {
            return None;
        }

        // 5. Direction
        let votes = signals.agreeing_votes(sentiment_sign);
        let mut forced_by_news = false;
        let mut direction = if sentiment_sign != 0 && votes >= cfg.min_agreeing_votes {
            reasons.push(format!("{} indicators agree with sentiment", votes));
            Direction::from_sign(sentiment_sign as f64)
        } else {
            match signals.forced_direction {
                Some(forced) if signals.agreeing_votes(forced.sign()) >= cfg.min_override_corroboration => {
                    forced_by_news = true;
                    reasons.push(format!("News override {}", forced));
                    forced
                }
                _ => Direction::Flat,
            }
        };
        // A forced direction against a neutral or opposing edge trades on a small fallback edge
        if forced_by_news && (expected_return * direction.sign() as f64) <= 0.0 {
            expected_return = direction.sign() as f64 * cfg.forced_fallback_edge;
            reasons.push(format!("Fallback edge {:.4} for news override", cfg.forced_fallback_edge));
        }

        let mut expected_profit_pct = expected_return.abs();
        let mut rr = expected_profit_pct / stop_pct;
        let mut rr_forced = false;
        if rr < cfg.min_rr && expected_profit_pct > 0.0 {
            expected_profit_pct = cfg.min_rr * stop_pct;
            rr = cfg.min_rr;
            rr_forced = true;
            reasons.push(format!("Profit target raised to {:.1}R", cfg.min_rr));
        }

        if direction != Direction::Flat && expected_profit_pct <= 0.0 {
            direction = Direction::Flat;
        }

        let agreeing_votes = signals.agreeing_votes(direction.sign());
        let expected_return_pct = match direction {
            Direction::Flat => expected_return,
            _ => direction.sign() as f64 * expected_profit_pct,
        };

        debug!(
            "{} fused: {} er={:.5} stop={:.5} rr={:.2} votes={}",
            candidate.symbol, direction, expected_return_pct, stop_pct, rr, agreeing_votes
        );

        Some(DraftPlan {
            direction,
            expected_return_pct,
            expected_profit_pct,
            stop_pct,
            rr,
            rr_forced,
            agreeing_votes,
            forced_by_news,
            reasons,
        })
    }

    fn session_multiplier(&self, now: DateTime<Utc>) -> f64 {
        if !self.config.session_adjustment {
            return 1.0;
        }
        let m = &self.config.session_multipliers;
        match MarketSession::at(now) {
            MarketSession::London => m.london,
            MarketSession::NewYork => m.new_york,
            MarketSession::Asia => m.asia,
            MarketSession::OffHours => m.off_hours,
            MarketSession::Weekend => m.weekend,
        }
    }
}
