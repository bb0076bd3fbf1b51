//! Decision Engines
//!
//! Pure numeric stages of the decision path. None of them perform I/O.

pub mod kelly;
pub mod leverage;
pub mod regime_detector;
pub mod signal_fusion;

pub use kelly::{size_position, KellySizing};
pub use leverage::{annualized_volatility, recommend_leverage};
pub use regime_detector::{RegimeAdjustment, RegimeDetector};
pub use signal_fusion::{DraftPlan, SignalFusion};
