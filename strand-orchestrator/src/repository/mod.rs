//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Analysis records are persisted through [`AnalysisStore`]; sample codes are
//! resolved through [`SampleDirectory`]. Both are traits so the service can
//! run against Postgres in production and in-memory stores in tests.

pub mod analysis;
pub mod memory;
pub mod sample;

use async_trait::async_trait;
use strand_core::domain::analysis::{AnalysisRecord, AnalysisStatus};
use thiserror::Error;
use uuid::Uuid;

pub use analysis::PgAnalysisRepository;
pub use memory::{InMemoryAnalysisStore, InMemorySampleDirectory};
pub use sample::PgSampleDirectory;

/// Errors raised by the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// `save` was called for a record that was never created
    #[error("Analysis {0} does not exist in the store")]
    Missing(Uuid),

    #[error("Analysis {id} has an unreadable row: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// Persistent store of analysis records
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn create(&self, record: &AnalysisRecord) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AnalysisRecord>, StoreError>;

    /// Overwrites the stored record with the same id
    async fn save(&self, record: &AnalysisRecord) -> Result<(), StoreError>;

    /// All records, most recently started first
    async fn list_all(&self) -> Result<Vec<AnalysisRecord>, StoreError>;

    async fn find_by_sample(&self, sample_id: Uuid) -> Result<Vec<AnalysisRecord>, StoreError>;

    async fn find_by_status(
        &self,
        status: AnalysisStatus,
    ) -> Result<Vec<AnalysisRecord>, StoreError>;
}

/// Resolves sample ids to their sample codes
#[async_trait]
pub trait SampleDirectory: Send + Sync {
    async fn find_sample_code(&self, sample_id: Uuid) -> Result<Option<String>, StoreError>;
}
