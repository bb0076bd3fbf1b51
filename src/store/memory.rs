//! In-process store for tests and dry runs

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{DocumentKind, StateStore, StoreError};
use crate::agent::correlation::PositionLedger;
use crate::agent::risk_budget::RiskLedger;
use crate::agentic::performance_db::TradeHistory;
use crate::params::ParameterSet;

/// Documents kept as serialized JSON, so encoding behaves like the file store
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<DocumentKind, String>>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail until switched back
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn read_doc<T: DeserializeOwned>(&self, kind: DocumentKind) -> Result<Option<T>, StoreError> {
        let docs = self.docs.lock();
        match docs.get(&kind) {
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|source| StoreError::Serde { kind, source }),
            None => Ok(None),
        }
    }

    fn write_doc<T: Serialize>(&self, kind: DocumentKind, doc: &T) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("writes disabled for {}", kind)));
        }
        let raw = serde_json::to_string(doc).map_err(|source| StoreError::Serde { kind, source })?;
        self.docs.lock().insert(kind, raw);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_trade_history(&self) -> Result<Option<TradeHistory>, StoreError> {
        self.read_doc(DocumentKind::TradeHistory)
    }

    async fn save_trade_history(&self, history: &TradeHistory) -> Result<(), StoreError> {
        self.write_doc(DocumentKind::TradeHistory, history)
    }

    async fn load_risk_ledger(&self) -> Result<Option<RiskLedger>, StoreError> {
        self.read_doc(DocumentKind::RiskLedger)
    }

    async fn save_risk_ledger(&self, ledger: &RiskLedger) -> Result<(), StoreError> {
        self.write_doc(DocumentKind::RiskLedger, ledger)
    }

    async fn load_positions(&self) -> Result<Option<PositionLedger>, StoreError> {
        self.read_doc(DocumentKind::Positions)
    }

    async fn save_positions(&self, positions: &PositionLedger) -> Result<(), StoreError> {
        self.write_doc(DocumentKind::Positions, positions)
    }

    async fn load_parameters(&self) -> Result<Option<ParameterSet>, StoreError> {
        self.read_doc(DocumentKind::Parameters)
    }

    async fn save_parameters(&self, params: &ParameterSet) -> Result<(), StoreError> {
        self.write_doc(DocumentKind::Parameters, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_writes_leave_previous_document() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            store.save_parameters(&ParameterSet::default()).await.unwrap();
            store.set_fail_writes(true);

            let mut changed = ParameterSet::default();
            changed.set(crate::params::names::KELLY_FRACTION, 0.65).unwrap();
            assert!(store.save_parameters(&changed).await.is_err());

            let loaded = store.load_parameters().await.unwrap().unwrap();
            assert_eq!(loaded.kelly_fraction(), 0.5);
            assert_eq!(store.write_count(), 1);
        });
    }
}
