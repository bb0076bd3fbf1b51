//! Agentic Module
//!
//! Self-learning and adaptive features:
//! - Trade history and performance metrics
//! - Failure attribution of closed trades
//! - Parameter learner over attributable outcomes

pub mod failure_attribution;
pub mod learner;
pub mod performance_db;

pub use failure_attribution::{Attribution, ExitContext, FailureClassifier};
pub use learner::{LearnError, LearnOutcome, ParamChange, ParameterLearner};
pub use performance_db::{IndicatorTally, PerformanceMetrics, TradeHistory};
