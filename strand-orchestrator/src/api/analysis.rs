//! Analysis API Handlers
//!
//! HTTP endpoints for creating and inspecting analyses.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use strand_core::domain::analysis::{AnalysisRecord, AnalysisStatus};
use strand_core::dto::analysis::CreateAnalysis;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::AnalysisService;

/// POST /analyses
/// Create an analysis and start its pipeline in the background
pub async fn create_analysis(
    State(service): State<Arc<AnalysisService>>,
    Json(req): Json<CreateAnalysis>,
) -> ApiResult<(StatusCode, Json<AnalysisRecord>)> {
    tracing::info!("Creating analysis for sample: {}", req.sample_id);

    let record = service.create(req).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /analyses/{id}
pub async fn get_analysis(
    State(service): State<Arc<AnalysisService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AnalysisRecord>> {
    tracing::debug!("Getting analysis: {}", id);

    Ok(Json(service.get(id).await?))
}

/// GET /analyses
pub async fn list_analyses(
    State(service): State<Arc<AnalysisService>>,
) -> ApiResult<Json<Vec<AnalysisRecord>>> {
    tracing::debug!("Listing all analyses");

    Ok(Json(service.list_all().await?))
}

/// GET /analyses/sample/{sample_id}
pub async fn list_analyses_by_sample(
    State(service): State<Arc<AnalysisService>>,
    Path(sample_id): Path<Uuid>,
) -> ApiResult<Json<Vec<AnalysisRecord>>> {
    tracing::debug!("Listing analyses for sample: {}", sample_id);

    Ok(Json(service.list_by_sample(sample_id).await?))
}

/// GET /analyses/status/{status}
pub async fn list_analyses_by_status(
    State(service): State<Arc<AnalysisService>>,
    Path(status): Path<String>,
) -> ApiResult<Json<Vec<AnalysisRecord>>> {
    let status = status
        .parse::<AnalysisStatus>()
        .map_err(ApiError::BadRequest)?;

    tracing::debug!("Listing analyses with status: {}", status);

    Ok(Json(service.list_by_status(status).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryAnalysisStore, InMemorySampleDirectory};
    use crate::service::{AnalysisSettings, ManualDispatcher, SystemClock};
    use async_trait::async_trait;
    use std::time::Duration;
    use strand_core::domain::command::{CommandDescriptor, CommandResult};
    use strand_runner::{CommandRunner, GatkStages, StageConfig};

    struct AlwaysOk;

    #[async_trait]
    impl CommandRunner for AlwaysOk {
        async fn execute(&self, command: CommandDescriptor) -> CommandResult {
            CommandResult::completed(
                command,
                Some(0),
                String::new(),
                String::new(),
                Duration::ZERO,
            )
        }
    }

    async fn service() -> (Arc<AnalysisService>, Uuid) {
        let samples = Arc::new(InMemorySampleDirectory::new());
        let sample_id = samples.register("S042").await;
        let service = AnalysisService::new(
            Arc::new(InMemoryAnalysisStore::new()),
            samples,
            Arc::new(GatkStages::new(Arc::new(AlwaysOk), StageConfig::default())),
            Arc::new(ManualDispatcher::new()),
            Arc::new(SystemClock),
            AnalysisSettings {
                output_dir: "/data/output".to_string(),
                sample_bam_root: "/data/samples".to_string(),
            },
        );
        (Arc::new(service), sample_id)
    }

    #[tokio::test]
    async fn test_create_then_fetch() {
        let (service, sample_id) = service().await;

        let (status, Json(created)) = create_analysis(
            State(service.clone()),
            Json(CreateAnalysis::new(sample_id, "v1")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.status, AnalysisStatus::Pending);

        let Json(fetched) = get_analysis(State(service.clone()), Path(created.id))
            .await
            .unwrap();
        assert_eq!(fetched, created);

        let Json(by_sample) = list_analyses_by_sample(State(service.clone()), Path(sample_id))
            .await
            .unwrap();
        assert_eq!(by_sample.len(), 1);

        let Json(pending) = list_analyses_by_status(State(service), Path("pending".to_string()))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_error_responses() {
        let (service, _) = service().await;

        let err = get_analysis(State(service.clone()), Path(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = create_analysis(
            State(service.clone()),
            Json(CreateAnalysis::new(Uuid::new_v4(), "v1")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = list_analyses_by_status(State(service.clone()), Path("QUEUED".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let Json(all) = list_analyses(State(service)).await.unwrap();
        assert!(all.is_empty());
    }
}
