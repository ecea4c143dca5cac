//! Sample Repository
//!
//! Read-only lookup of sample codes. Sample CRUD lives elsewhere; the
//! orchestrator only needs the code to lay out output paths.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{SampleDirectory, StoreError};

pub struct PgSampleDirectory {
    pool: PgPool,
}

impl PgSampleDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SampleDirectory for PgSampleDirectory {
    async fn find_sample_code(&self, sample_id: Uuid) -> Result<Option<String>, StoreError> {
        let code = sqlx::query_scalar::<_, String>("SELECT sample_code FROM samples WHERE id = $1")
            .bind(sample_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(code)
    }
}
