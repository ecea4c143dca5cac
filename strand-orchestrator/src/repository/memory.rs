//! In-memory repositories
//!
//! Used by tests and by embedders that do not want a database.

use async_trait::async_trait;
use std::collections::HashMap;
use strand_core::domain::analysis::{AnalysisRecord, AnalysisStatus};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AnalysisStore, SampleDirectory, StoreError};

#[derive(Default)]
pub struct InMemoryAnalysisStore {
    records: RwLock<HashMap<Uuid, AnalysisRecord>>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn collect<F>(&self, keep: F) -> Vec<AnalysisRecord>
    where
        F: Fn(&AnalysisRecord) -> bool,
    {
        let records = self.records.read().await;
        let mut matching: Vec<_> = records.values().filter(|r| keep(*r)).cloned().collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn create(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AnalysisRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn save(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(record.id)),
        }
    }

    async fn list_all(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        Ok(self.collect(|_| true).await)
    }

    async fn find_by_sample(&self, sample_id: Uuid) -> Result<Vec<AnalysisRecord>, StoreError> {
        Ok(self.collect(|r| r.sample_id == sample_id).await)
    }

    async fn find_by_status(
        &self,
        status: AnalysisStatus,
    ) -> Result<Vec<AnalysisRecord>, StoreError> {
        let mut matching = self.collect(|r| r.status == status).await;
        matching.reverse();
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemorySampleDirectory {
    codes: RwLock<HashMap<Uuid, String>>,
}

impl InMemorySampleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sample and returns its id
    pub async fn register(&self, sample_code: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.codes.write().await.insert(id, sample_code.into());
        id
    }
}

#[async_trait]
impl SampleDirectory for InMemorySampleDirectory {
    async fn find_sample_code(&self, sample_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self.codes.read().await.get(&sample_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(sample_id: Uuid, offset_secs: i64) -> AnalysisRecord {
        AnalysisRecord {
            id: Uuid::new_v4(),
            sample_id,
            pipeline_version: "v1".to_string(),
            status: AnalysisStatus::Pending,
            started_at: Utc::now() + Duration::seconds(offset_secs),
            finished_at: None,
            vcf_path: "/out/S.vcf".to_string(),
            bam_path: "/in/S.bam".to_string(),
            log_path: "/out/S.log".to_string(),
            result_summary: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_save_requires_existing_record() {
        let store = InMemoryAnalysisStore::new();
        let record = record(Uuid::new_v4(), 0);

        assert!(matches!(
            store.save(&record).await,
            Err(StoreError::Missing(id)) if id == record.id
        ));

        store.create(&record).await.unwrap();
        let mut updated = record.clone();
        updated.mark_running().unwrap();
        store.save(&updated).await.unwrap();

        let stored = store.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Running);
    }

    #[tokio::test]
    async fn test_listing_filters_and_orders() {
        let store = InMemoryAnalysisStore::new();
        let sample = Uuid::new_v4();
        let older = record(sample, -60);
        let newer = record(sample, 0);
        let other = record(Uuid::new_v4(), 30);
        for r in [&older, &newer, &other] {
            store.create(r).await.unwrap();
        }

        let all = store.list_all().await.unwrap();
        assert_eq!(all[0].id, other.id);

        let by_sample = store.find_by_sample(sample).await.unwrap();
        let ids: Vec<_> = by_sample.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        let pending = store.find_by_status(AnalysisStatus::Pending).await.unwrap();
        assert_eq!(pending.first().map(|r| r.id), Some(older.id));
        assert!(store.find_by_status(AnalysisStatus::Done).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sample_directory_lookup() {
        let samples = InMemorySampleDirectory::new();
        let id = samples.register("S001").await;

        assert_eq!(
            samples.find_sample_code(id).await.unwrap().as_deref(),
            Some("S001")
        );
        assert_eq!(samples.find_sample_code(Uuid::new_v4()).await.unwrap(), None);
    }
}
