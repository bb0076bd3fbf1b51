//! Prometheus metrics export

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

pub fn init_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    info!("Prometheus metrics server started on {}", addr);
    Ok(())
}

fn register_metrics() {
    // Decision metrics
    describe_counter!("adaptive_risk_engine_decisions_total", "Candidate decisions by outcome");
    describe_histogram!("adaptive_risk_engine_cycle_latency_ms", "Decision cycle latency");

    // Risk metrics
    describe_gauge!("adaptive_risk_engine_daily_risk_used", "Risk booked today (stop x leverage)");
    describe_gauge!("adaptive_risk_engine_open_positions", "Number of open positions");

    // Outcome metrics
    describe_counter!("adaptive_risk_engine_trades_closed_total", "Closed trades by failure type");

    // Learning metrics
    describe_counter!("adaptive_risk_engine_learner_runs_total", "Learner runs by outcome");
    describe_gauge!("adaptive_risk_engine_parameter_version", "Published parameter set version");

    // System metrics
    describe_counter!("adaptive_risk_engine_persistence_failures_total", "Failed document writes");
}

pub fn record_decision(outcome: &'static str) {
    counter!("adaptive_risk_engine_decisions_total", "outcome" => outcome).increment(1);
}

pub fn record_cycle_latency(latency_ms: f64) {
    histogram!("adaptive_risk_engine_cycle_latency_ms").record(latency_ms);
}

pub fn record_daily_risk(used: f64) {
    gauge!("adaptive_risk_engine_daily_risk_used").set(used);
}

pub fn record_open_positions(count: usize) {
    gauge!("adaptive_risk_engine_open_positions").set(count as f64);
}

pub fn record_closed_trade(failure_type: &'static str) {
    counter!("adaptive_risk_engine_trades_closed_total", "failure_type" => failure_type).increment(1);
}

pub fn record_learner_run(outcome: &'static str) {
    counter!("adaptive_risk_engine_learner_runs_total", "outcome" => outcome).increment(1);
}

pub fn record_parameter_version(version: u64) {
    gauge!("adaptive_risk_engine_parameter_version").set(version as f64);
}

pub fn record_persistence_failure() {
    counter!("adaptive_risk_engine_persistence_failures_total").increment(1);
}
