//! JSON file store

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use super::{DocumentKind, StateStore, StoreError};
use crate::agent::correlation::PositionLedger;
use crate::agent::risk_budget::RiskLedger;
use crate::agentic::performance_db::TradeHistory;
use crate::params::ParameterSet;

/// Pretty-printed JSON documents in one directory
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_of(&self, kind: DocumentKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    async fn read_doc<T: DeserializeOwned>(&self, kind: DocumentKind) -> Result<Option<T>, StoreError> {
        let path = self.path_of(kind);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let doc = serde_json::from_str(&content).map_err(|source| StoreError::Serde { kind, source })?;
        debug!("Loaded {} from {:?}", kind, path);
        Ok(Some(doc))
    }

    /// Write to a sibling temp file, then rename over the target
    async fn write_doc<T: Serialize + Sync>(&self, kind: DocumentKind, doc: &T) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Serde { kind, source })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io { path: self.dir.clone(), source })?;

        let path = self.path_of(kind);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|source| StoreError::Io { path: tmp.clone(), source })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io { path: path.clone(), source })?;

        debug!("Saved {} to {:?}", kind, path);
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_trade_history(&self) -> Result<Option<TradeHistory>, StoreError> {
        self.read_doc(DocumentKind::TradeHistory).await
    }

    async fn save_trade_history(&self, history: &TradeHistory) -> Result<(), StoreError> {
        self.write_doc(DocumentKind::TradeHistory, history).await
    }

    async fn load_risk_ledger(&self) -> Result<Option<RiskLedger>, StoreError> {
        self.read_doc(DocumentKind::RiskLedger).await
    }

    async fn save_risk_ledger(&self, ledger: &RiskLedger) -> Result<(), StoreError> {
        self.write_doc(DocumentKind::RiskLedger, ledger).await
    }

    async fn load_positions(&self) -> Result<Option<PositionLedger>, StoreError> {
        self.read_doc(DocumentKind::Positions).await
    }

    async fn save_positions(&self, positions: &PositionLedger) -> Result<(), StoreError> {
        self.write_doc(DocumentKind::Positions, positions).await
    }

    async fn load_parameters(&self) -> Result<Option<ParameterSet>, StoreError> {
        self.read_doc(DocumentKind::Parameters).await
    }

    async fn save_parameters(&self, params: &ParameterSet) -> Result<(), StoreError> {
        self.write_doc(DocumentKind::Parameters, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("adaptive-risk-engine-{}", crate::utils::helpers::generate_id()))
    }

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let store = JsonFileStore::new(temp_dir());
        assert!(store.load_risk_ledger().await.unwrap().is_none());
        assert!(store.load_parameters().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ledger_and_params_survive_reload() {
        let dir = temp_dir();
        let store = JsonFileStore::new(&dir);

        let mut ledger = RiskLedger::default();
        let day = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        ledger.add(day, 0.004);
        store.save_risk_ledger(&ledger).await.unwrap();

        let mut params = ParameterSet::default();
        params.set(crate::params::names::KELLY_FRACTION, 0.42).unwrap();
        store.save_parameters(&params).await.unwrap();

        let reopened = JsonFileStore::new(&dir);
        let loaded = reopened.load_risk_ledger().await.unwrap().unwrap();
        assert!((loaded.used(day) - 0.004).abs() < 1e-12);
        let loaded = reopened.load_parameters().await.unwrap().unwrap();
        assert_eq!(loaded.kelly_fraction(), 0.42);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_corrupt_document_is_serde_error() {
        let dir = temp_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(DocumentKind::Positions.file_name()), "{not json")
            .await
            .unwrap();

        let store = JsonFileStore::new(&dir);
        let err = store.load_positions().await.unwrap_err();
        assert!(matches!(err, StoreError::Serde { kind: DocumentKind::Positions, .. }));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
