//! Persisted State Store
//!
//! One logical JSON document per record type, always rewritten whole:
//! - Trade history (bounded, most recent N)
//! - Daily risk ledger
//! - Open positions
//! - Adaptive parameter set
//!
//! Components never touch files directly; the agent owns a `StateStore` and
//! flushes documents after each final decision.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::agent::correlation::PositionLedger;
use crate::agent::risk_budget::RiskLedger;
use crate::agentic::performance_db::TradeHistory;
use crate::params::ParameterSet;

/// Persisted document types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    TradeHistory,
    RiskLedger,
    Positions,
    Parameters,
}

impl DocumentKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            DocumentKind::TradeHistory => "trade_history.json",
            DocumentKind::RiskLedger => "risk_ledger.json",
            DocumentKind::Positions => "positions.json",
            DocumentKind::Parameters => "parameters.json",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::TradeHistory => write!(f, "trade history"),
            DocumentKind::RiskLedger => write!(f, "risk ledger"),
            DocumentKind::Positions => write!(f, "positions"),
            DocumentKind::Parameters => write!(f, "parameters"),
        }
    }
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode or decode {kind}: {source}")]
    Serde {
        kind: DocumentKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Whole-document persistence for engine state. `Ok(None)` means the document
/// has never been written.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_trade_history(&self) -> Result<Option<TradeHistory>, StoreError>;
    async fn save_trade_history(&self, history: &TradeHistory) -> Result<(), StoreError>;

    async fn load_risk_ledger(&self) -> Result<Option<RiskLedger>, StoreError>;
    async fn save_risk_ledger(&self, ledger: &RiskLedger) -> Result<(), StoreError>;

    async fn load_positions(&self) -> Result<Option<PositionLedger>, StoreError>;
    async fn save_positions(&self, positions: &PositionLedger) -> Result<(), StoreError>;

    async fn load_parameters(&self) -> Result<Option<ParameterSet>, StoreError>;
    async fn save_parameters(&self, params: &ParameterSet) -> Result<(), StoreError>;
}
