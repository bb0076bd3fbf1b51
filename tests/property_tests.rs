//! Property-based tests using proptest
//!
//! These tests verify sizing, leverage, budget and learning invariants.

use adaptive_risk_engine::agent::correlation::{check_exposure, weighted_exposure};
use adaptive_risk_engine::agent::{CorrelationDecision, CorrelationModel, DailyRiskBudget, PositionLedger, RiskLedger};
use adaptive_risk_engine::agentic::{LearnOutcome, ParameterLearner};
use adaptive_risk_engine::config::{FusionConfig, LearnerConfig, LeverageConfig, SizingConfig};
use adaptive_risk_engine::engines::{recommend_leverage, size_position, SignalFusion};
use adaptive_risk_engine::params::{ParameterSet, WEIGHT_MAX, WEIGHT_MIN};
use adaptive_risk_engine::utils::types::*;
use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

struct ConstantCorrelation(f64);

impl CorrelationModel for ConstantCorrelation {
    fn correlation(&self, _a: &str, _b: &str) -> f64 {
        self.0
    }
}

fn position(symbol: &str, size: f64, win: bool, votes: &[i8]) -> Position {
    let mut signals = SignalVector::default();
    for (indicator, vote) in Indicator::ALL.iter().zip(votes) {
        signals.polarities.insert(*indicator, Polarity::from(*vote as f64));
    }
    Position {
        id: symbol.to_string(),
        symbol: symbol.to_string(),
        asset_class: AssetClass::Forex,
        direction: Direction::Long,
        size_fraction: size,
        leverage: 20,
        stop_pct: 0.0075,
        entry_price: 1.0,
        stop_price: 0.9925,
        target_price: 1.015,
        entry_time: Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap(),
        status: if win { PositionStatus::Win } else { PositionStatus::Loss },
        entry_signals: signals,
        entry_volatility: 0.005,
        entry_atr_pct: 0.005,
        regime: Regime::Neutral,
        correlation_limited: false,
    }
}

fn record(win: bool, return_pct: f64, votes: &[i8]) -> TradeRecord {
    TradeRecord {
        position: position("EURUSD", 0.05, win, votes),
        exit_price: 1.0 + return_pct,
        exit_time: Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap(),
        exit_volatility: 0.005,
        exit_atr_pct: 0.005,
        return_pct,
        hold_hours: 6.0,
        failure_type: if win { FailureType::None } else { FailureType::Mixed },
        attribution_reasons: vec![],
    }
}

fn ledger(sizes: &[f64]) -> PositionLedger {
    let mut ledger = PositionLedger::default();
    for (i, size) in sizes.iter().enumerate() {
        ledger.insert(position(&format!("SYM{}", i), *size, true, &[]));
    }
    ledger
}

fn trade_strategy() -> impl Strategy<Value = (bool, f64, Vec<i8>)> {
    (
        any::<bool>(),
        0.001f64..0.05,
        prop::collection::vec(-1i8..=1, Indicator::ALL.len()),
    )
        .prop_map(|(win, magnitude, votes)| (win, if win { magnitude } else { -magnitude }, votes))
}

proptest! {
    #[test]
    fn prop_kelly_size_within_bounds(
        probability in -0.5f64..1.5,
        confidence in -1.0f64..2.0,
        rr in -1.0f64..20.0,
    ) {
        let sizing = SizingConfig::default();
        let estimate = WinEstimate { probability, confidence };
        let result = size_position(&estimate, rr, &ParameterSet::default(), &sizing);
        prop_assert!(result.size_fraction >= sizing.min_position_size);
        prop_assert!(result.size_fraction <= sizing.max_position_size);
    }

    #[test]
    fn prop_actionable_plans_respect_stop_and_rr(
        sentiment in -1.0f64..1.0,
        news_count in 0u32..10,
        atr_pct in 0.0f64..0.05,
        votes in prop::collection::vec(-1i8..=1, Indicator::ALL.len()),
        forex in any::<bool>(),
    ) {
        let mut signals = SignalVector { sentiment, news_count, ..Default::default() };
        for (indicator, vote) in Indicator::ALL.iter().zip(&votes) {
            signals.polarities.insert(*indicator, Polarity::from(*vote as f64));
        }
        let candidate = Candidate {
            symbol: "EURUSD".to_string(),
            asset_class: if forex { AssetClass::Forex } else { AssetClass::Index },
            signals,
            snapshot: MarketSnapshot { price: 1.1, atr_pct, ..Default::default() }.sanitized(),
            win_estimate: None,
        };
        let config = FusionConfig::default();
        let min_rr = config.min_rr;
        let params = ParameterSet::default();
        let draft = SignalFusion::new(config)
            .fuse(&candidate, &RegimeReading::default(), &params, Utc::now());

        if let Some(draft) = draft {
            prop_assert!(draft.stop_pct >= params.min_stop_pct());
            if draft.is_actionable() {
                prop_assert!(draft.stop_pct > 0.0);
                prop_assert!(draft.rr >= min_rr - 1e-12);
                prop_assert!(draft.expected_profit_pct > 0.0);
            }
        }
    }

    #[test]
    fn prop_leverage_within_ceiling(
        rr in -5.0f64..50.0,
        volatility in 0.0f64..5.0,
        forex in any::<bool>(),
    ) {
        let config = LeverageConfig::default();
        let asset_class = if forex { AssetClass::Forex } else { AssetClass::Stock };
        let ceiling = if forex { config.forex_ceiling } else { config.default_ceiling };
        let leverage = recommend_leverage(rr, volatility, asset_class, &config);
        prop_assert!(leverage >= 1);
        prop_assert!(leverage <= ceiling);
        if volatility > config.very_high_volatility {
            prop_assert!(leverage <= config.very_high_volatility_ceiling);
        }
    }

    #[test]
    fn prop_daily_budget_never_exceeded(
        limit in 0.001f64..1.0,
        risks in prop::collection::vec(0.0f64..0.3, 1..40),
    ) {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let mut budget = DailyRiskBudget::new(limit, 30, RiskLedger::default());
        for risk in risks {
            if budget.check(today, risk).is_ok() {
                budget.commit(today, risk);
            }
        }
        prop_assert!(budget.used(today) <= limit + 1e-9);
    }

    #[test]
    fn prop_exposure_monotonic_in_correlation(
        sizes in prop::collection::vec(0.01f64..0.25, 0..8),
        c1 in 0.0f64..1.0,
        c2 in 0.0f64..1.0,
    ) {
        let (lo, hi) = if c1 <= c2 { (c1, c2) } else { (c2, c1) };
        let ledger = ledger(&sizes);
        let low = weighted_exposure("EURJPY", &ledger, &ConstantCorrelation(lo), 0.5);
        let high = weighted_exposure("EURJPY", &ledger, &ConstantCorrelation(hi), 0.5);
        prop_assert!(low <= high + 1e-12);
        // Sign does not matter
        let negative = weighted_exposure("EURJPY", &ledger, &ConstantCorrelation(-hi), 0.5);
        prop_assert!((negative - high).abs() < 1e-12);
    }

    #[test]
    fn prop_resize_stays_within_request_and_minimum(
        sizes in prop::collection::vec(0.01f64..0.25, 0..8),
        correlation in -1.0f64..1.0,
        size in 0.01f64..0.25,
    ) {
        let min_size = 0.01;
        let decision = check_exposure(
            "EURJPY",
            size,
            &ledger(&sizes),
            &ConstantCorrelation(correlation),
            &ParameterSet::default(),
            min_size,
        );
        match decision {
            CorrelationDecision::Accept { size: accepted, .. } => prop_assert_eq!(accepted, size),
            CorrelationDecision::Resize { size: resized, .. } => {
                prop_assert!(resized >= min_size);
                prop_assert!(resized <= size);
            }
            CorrelationDecision::Reject { exposure, cap } => prop_assert!(cap - exposure < min_size),
        }
    }

    #[test]
    fn prop_learning_keeps_parameters_in_bounds(
        trades in prop::collection::vec(trade_strategy(), 30..120),
    ) {
        let records: Vec<TradeRecord> = trades
            .iter()
            .map(|(win, ret, votes)| record(*win, *ret, votes))
            .collect();
        let learner = ParameterLearner::new(LearnerConfig::default());
        let current = ParameterSet::default();

        match learner.learn(&records, &current, Utc::now()) {
            Ok(LearnOutcome::Updated { params, .. }) => {
                prop_assert!(params.is_within_bounds());
                prop_assert_eq!(params.version, current.version + 1);
                for indicator in Indicator::ALL {
                    let weight = params.indicator_weight(indicator);
                    prop_assert!((WEIGHT_MIN..=WEIGHT_MAX).contains(&weight));
                }
            }
            Ok(_) => {}
            Err(e) => prop_assert!(false, "learning failed: {}", e),
        }
    }
}
