//! Benchmarks for the per-candidate decision path
//!
//! Run with: cargo bench

use adaptive_risk_engine::agent::{CorrelationModel, HeuristicCorrelation, PositionLedger};
use adaptive_risk_engine::config::{AppConfig, FusionConfig, LeverageConfig, SizingConfig};
use adaptive_risk_engine::engines::{annualized_volatility, recommend_leverage, size_position, SignalFusion};
use adaptive_risk_engine::params::ParameterSet;
use adaptive_risk_engine::store::MemoryStore;
use adaptive_risk_engine::utils::helpers::ManualClock;
use adaptive_risk_engine::utils::types::*;
use adaptive_risk_engine::DecisionAgent;
use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::sync::Arc;

const SYMBOLS: [&str; 8] = ["EURUSD", "GBPUSD", "USDJPY", "EURJPY", "AUDCAD", "NZDCHF", "GBPJPY", "USDCAD"];

fn candidate(symbol: &str) -> Candidate {
    let mut signals = SignalVector { sentiment: 0.4, news_count: 2, ..Default::default() };
    for (i, indicator) in Indicator::ALL.iter().enumerate() {
        let polarity = if i % 3 == 0 { Polarity::Bearish } else { Polarity::Bullish };
        signals.polarities.insert(*indicator, polarity);
    }
    Candidate {
        symbol: symbol.to_string(),
        asset_class: AssetClass::Forex,
        signals,
        snapshot: MarketSnapshot {
            price: 1.1,
            support: 1.09,
            resistance: 1.12,
            psych_level: 1.1,
            atr_pct: 0.004,
            volatility_hourly: 0.006,
            ..Default::default()
        },
        win_estimate: Some(WinEstimate { probability: 0.58, confidence: 0.7 }),
    }
}

/// Benchmark signal fusion for one candidate
fn bench_signal_fusion(c: &mut Criterion) {
    let fusion = SignalFusion::new(FusionConfig::default());
    let params = ParameterSet::default();
    let reading = RegimeReading::default();
    let candidate = candidate("EURUSD");
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();

    c.bench_function("signal_fusion", |b| {
        b.iter(|| black_box(fusion.fuse(black_box(&candidate), &reading, &params, now)))
    });
}

/// Benchmark Kelly sizing and leverage together
fn bench_sizing(c: &mut Criterion) {
    let params = ParameterSet::default();
    let sizing = SizingConfig::default();
    let leverage = LeverageConfig::default();
    let estimate = WinEstimate { probability: 0.58, confidence: 0.7 };

    c.bench_function("kelly_and_leverage", |b| {
        b.iter(|| {
            let rr = black_box(2.4);
            let size = size_position(&estimate, rr, &params, &sizing);
            let lev = recommend_leverage(rr, annualized_volatility(black_box(0.006)), AssetClass::Forex, &leverage);
            black_box((size, lev))
        })
    });
}

/// Benchmark correlated exposure against growing ledgers
fn bench_correlation_exposure(c: &mut Criterion) {
    let model = HeuristicCorrelation::default();
    let params = ParameterSet::default();
    let mut group = c.benchmark_group("correlation_exposure");

    for open in [1usize, 4, 8] {
        let mut ledger = PositionLedger::default();
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        for symbol in SYMBOLS.iter().take(open) {
            let position = Position {
                id: symbol.to_string(),
                symbol: symbol.to_string(),
                asset_class: AssetClass::Forex,
                direction: Direction::Long,
                size_fraction: 0.05,
                leverage: 20,
                stop_pct: 0.006,
                entry_price: 1.1,
                stop_price: 1.0934,
                target_price: 1.1132,
                entry_time: now,
                status: PositionStatus::Open,
                entry_signals: candidate(symbol).signals,
                entry_volatility: 0.006,
                entry_atr_pct: 0.004,
                regime: Regime::Neutral,
                correlation_limited: false,
            };
            ledger.insert(position);
        }
        group.bench_with_input(BenchmarkId::from_parameter(open), &ledger, |b, ledger| {
            b.iter(|| {
                black_box(adaptive_risk_engine::agent::correlation::check_exposure(
                    "CHFJPY",
                    0.08,
                    ledger,
                    &model as &dyn CorrelationModel,
                    &params,
                    0.01,
                ))
            })
        });
    }
    group.finish();
}

/// Benchmark a full decision cycle on a fresh agent
fn bench_run_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut config = AppConfig::default();
    config.risk.daily_risk_limit = 100.0;
    let candidates: Vec<Candidate> = SYMBOLS.iter().map(|s| candidate(s)).collect();

    c.bench_function("run_cycle_8_candidates", |b| {
        b.iter_batched(
            || {
                let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()));
                (
                    DecisionAgent::new(config.clone(), Arc::new(MemoryStore::new()), clock),
                    candidates.clone(),
                )
            },
            |(agent, candidates)| rt.block_on(async { black_box(agent.run_cycle(candidates).await) }),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_signal_fusion,
    bench_sizing,
    bench_correlation_exposure,
    bench_run_cycle,
);
criterion_main!(benches);
