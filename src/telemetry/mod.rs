//! Telemetry Module

mod logging;
mod metrics;

pub use logging::init_logging;
pub use self::metrics::init_metrics;
pub use self::metrics::{
    record_closed_trade, record_cycle_latency, record_daily_risk, record_decision,
    record_learner_run, record_open_positions, record_parameter_version, record_persistence_failure,
};
