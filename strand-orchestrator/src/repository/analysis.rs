//! Analysis Repository
//!
//! Handles all database operations related to analysis records.

use async_trait::async_trait;
use sqlx::PgPool;
use strand_core::domain::analysis::{AnalysisRecord, AnalysisStatus};
use uuid::Uuid;

use super::{AnalysisStore, StoreError};

const SELECT_COLUMNS: &str = r#"
    SELECT id, sample_id, pipeline_version, status, started_at, finished_at,
           vcf_path, bam_path, log_path, result_summary, error_message
    FROM analyses
"#;

pub struct PgAnalysisRepository {
    pool: PgPool,
}

impl PgAnalysisRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisRepository {
    async fn create(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO analyses (id, sample_id, pipeline_version, status, started_at,
                                  finished_at, vcf_path, bam_path, log_path,
                                  result_summary, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.sample_id)
        .bind(&record.pipeline_version)
        .bind(record.status.as_str())
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(&record.vcf_path)
        .bind(&record.bam_path)
        .bind(&record.log_path)
        .bind(&record.result_summary)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AnalysisRecord>, StoreError> {
        let row = sqlx::query_as::<_, AnalysisRow>(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AnalysisRecord::try_from).transpose()
    }

    async fn save(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE analyses
            SET status = $1, finished_at = $2, result_summary = $3, error_message = $4,
                vcf_path = $5, bam_path = $6, log_path = $7
            WHERE id = $8
            "#,
        )
        .bind(record.status.as_str())
        .bind(record.finished_at)
        .bind(&record.result_summary)
        .bind(&record.error_message)
        .bind(&record.vcf_path)
        .bind(&record.bam_path)
        .bind(&record.log_path)
        .bind(record.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(record.id));
        }

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AnalysisRow>(&format!(
            "{} ORDER BY started_at DESC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AnalysisRecord::try_from).collect()
    }

    async fn find_by_sample(&self, sample_id: Uuid) -> Result<Vec<AnalysisRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AnalysisRow>(&format!(
            "{} WHERE sample_id = $1 ORDER BY started_at DESC",
            SELECT_COLUMNS
        ))
        .bind(sample_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AnalysisRecord::try_from).collect()
    }

    async fn find_by_status(
        &self,
        status: AnalysisStatus,
    ) -> Result<Vec<AnalysisRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AnalysisRow>(&format!(
            "{} WHERE status = $1 ORDER BY started_at ASC",
            SELECT_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AnalysisRecord::try_from).collect()
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: Uuid,
    sample_id: Uuid,
    pipeline_version: String,
    status: String,
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
    vcf_path: String,
    bam_path: String,
    log_path: String,
    result_summary: Option<String>,
    error_message: Option<String>,
}

impl TryFrom<AnalysisRow> for AnalysisRecord {
    type Error = StoreError;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AnalysisStatus>()
            .map_err(|reason| StoreError::Corrupt { id: row.id, reason })?;

        Ok(AnalysisRecord {
            id: row.id,
            sample_id: row.sample_id,
            pipeline_version: row.pipeline_version,
            status,
            started_at: row.started_at,
            finished_at: row.finished_at,
            vcf_path: row.vcf_path,
            bam_path: row.bam_path,
            log_path: row.log_path,
            result_summary: row.result_summary,
            error_message: row.error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> AnalysisRow {
        AnalysisRow {
            id: Uuid::new_v4(),
            sample_id: Uuid::new_v4(),
            pipeline_version: "v1".to_string(),
            status: status.to_string(),
            started_at: chrono::Utc::now(),
            finished_at: None,
            vcf_path: "/data/output/S001/0a1b2c3d/S001.vcf".to_string(),
            bam_path: "/data/samples/S001/S001.bam".to_string(),
            log_path: "/data/output/S001/0a1b2c3d/S001.log".to_string(),
            result_summary: None,
            error_message: None,
        }
    }

    #[test]
    fn test_row_conversion() {
        let record = AnalysisRecord::try_from(row("RUNNING")).unwrap();
        assert_eq!(record.status, AnalysisStatus::Running);
        assert_eq!(record.pipeline_version, "v1");
    }

    #[test]
    fn test_unknown_status_is_reported() {
        let err = AnalysisRecord::try_from(row("Queued")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
