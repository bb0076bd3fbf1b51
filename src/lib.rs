//! Adaptive Risk-Weighted Decision Engine Library
//!
//! Turns per-symbol signal vectors and market snapshots into sized, leveraged,
//! risk-budgeted trade plans, and recalibrates its own parameters from closed trades.

pub mod agent;
pub mod agentic;
pub mod config;
pub mod engines;
pub mod params;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod utils;

// Re-export main types
pub use agent::{CycleReport, Decision, DecisionAgent, DecisionOutcome, Quote, RejectReason};
pub use config::AppConfig;
pub use params::ParameterSet;
pub use state::SharedParameters;
pub use store::{JsonFileStore, MemoryStore, StateStore, StoreError};
pub use utils::helpers::{Clock, ManualClock, SystemClock};
pub use utils::types::{
    AssetClass, Candidate, Direction, FailureType, Indicator, MarketSnapshot, Polarity, Position,
    PositionStatus, SignalVector, TradePlan, TradeRecord, WinEstimate,
};
