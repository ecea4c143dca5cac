//! Analysis Service
//!
//! Creates analysis records and drives them through the three-stage
//! variant pipeline in the background.

use std::sync::Arc;

use strand_core::domain::analysis::{
    AnalysisRecord, AnalysisStatus, InvalidTransition, RunOutcome, Stage,
};
use strand_core::domain::command::{CommandResult, FailureKind};
use strand_core::dto::analysis::{CreateAnalysis, RunOverrides};
use strand_runner::GatkStages;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::repository::{AnalysisStore, SampleDirectory, StoreError};
use crate::service::clock::Clock;
use crate::service::dispatch::TaskDispatcher;

/// Service error type
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Sample not found: {0}")]
    SampleNotFound(Uuid),

    #[error("Analysis not found: {0}")]
    NotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Filesystem layout for analysis outputs
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Root under which `<sample>/<run>/` output directories are created
    pub output_dir: String,

    /// Root of the conventional `<sample>/<sample>.bam` input layout
    pub sample_bam_root: String,
}

pub struct AnalysisService {
    store: Arc<dyn AnalysisStore>,
    samples: Arc<dyn SampleDirectory>,
    stages: Arc<GatkStages>,
    dispatcher: Arc<dyn TaskDispatcher>,
    clock: Arc<dyn Clock>,
    settings: AnalysisSettings,
}

impl AnalysisService {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        samples: Arc<dyn SampleDirectory>,
        stages: Arc<GatkStages>,
        dispatcher: Arc<dyn TaskDispatcher>,
        clock: Arc<dyn Clock>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            store,
            samples,
            stages,
            dispatcher,
            clock,
            settings,
        }
    }

    /// Create a PENDING analysis and schedule its pipeline run
    ///
    /// Returns as soon as the record is persisted; the run happens on the
    /// dispatcher.
    pub async fn create(
        self: &Arc<Self>,
        req: CreateAnalysis,
    ) -> Result<AnalysisRecord, AnalysisError> {
        if req.pipeline_version.trim().is_empty() {
            return Err(AnalysisError::Validation(
                "pipeline_version cannot be empty".to_string(),
            ));
        }

        let sample_code = self
            .samples
            .find_sample_code(req.sample_id)
            .await?
            .ok_or(AnalysisError::SampleNotFound(req.sample_id))?;

        let run_dir = format!(
            "{}/{}/{}",
            self.settings.output_dir.trim_end_matches('/'),
            sample_code,
            short_run_id()
        );

        let bam_path = req
            .bam_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{}/{}/{}.bam",
                    self.settings.sample_bam_root.trim_end_matches('/'),
                    sample_code,
                    sample_code
                )
            });

        let record = AnalysisRecord {
            id: Uuid::new_v4(),
            sample_id: req.sample_id,
            pipeline_version: req.pipeline_version.trim().to_string(),
            status: AnalysisStatus::Pending,
            started_at: self.clock.now(),
            finished_at: None,
            vcf_path: format!("{}/{}.vcf", run_dir, sample_code),
            bam_path,
            log_path: format!("{}/{}.log", run_dir, sample_code),
            result_summary: None,
            error_message: None,
        };

        self.store.create(&record).await?;

        info!(
            "Analysis created: {} for sample: {} ({})",
            record.id, sample_code, record.pipeline_version
        );

        let service = Arc::clone(self);
        let overrides = req.overrides();
        let id = record.id;
        self.dispatcher.dispatch(Box::pin(async move {
            service.execute(id, overrides).await;
        }));

        Ok(record)
    }

    /// Run the pipeline for `id`, turning any fault into a FAILED record
    ///
    /// The body runs in its own task so a panic surfaces as a `JoinError`
    /// rather than tearing down the caller.
    pub async fn execute(self: Arc<Self>, id: Uuid, overrides: RunOverrides) -> RunOutcome {
        let worker = Arc::clone(&self);
        let handle = tokio::spawn(async move { worker.run(id, &overrides).await });

        let fault = match handle.await {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(err)) => err.to_string(),
            Err(join_err) => panic_message(join_err),
        };

        error!("Analysis {} aborted: {}", id, fault);

        let outcome = RunOutcome::Aborted { message: fault };
        self.record_fault(id, &outcome).await;
        outcome
    }

    /// Orchestration body: RUNNING, then calling, filtering and annotation
    pub async fn run(
        &self,
        id: Uuid,
        overrides: &RunOverrides,
    ) -> Result<RunOutcome, AnalysisError> {
        let mut record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(AnalysisError::NotFound(id))?;

        record.mark_running()?;
        self.store.save(&record).await?;

        let sample_code = self
            .samples
            .find_sample_code(record.sample_id)
            .await?
            .ok_or(AnalysisError::SampleNotFound(record.sample_id))?;

        info!("Starting analysis {} for sample {}", id, sample_code);

        let outcome = self.run_stages(&record, &sample_code, overrides).await;

        match &outcome {
            RunOutcome::Completed { vcf_path } => {
                info!("Analysis {} completed. Final VCF: {}", id, vcf_path)
            }
            other => warn!("Analysis {} failed: {}", id, other.describe()),
        }

        self.finish(&mut record, &outcome).await?;
        Ok(outcome)
    }

    async fn run_stages(
        &self,
        record: &AnalysisRecord,
        sample_code: &str,
        overrides: &RunOverrides,
    ) -> RunOutcome {
        let run_dir = record
            .vcf_path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or(".");
        let raw_vcf = format!("{}/{}.raw.vcf", run_dir, sample_code);
        let filtered_vcf = format!("{}/{}.filtered.vcf", run_dir, sample_code);
        let reference = overrides.reference_genome.as_deref();

        let result = self
            .stages
            .call_variants(
                &record.bam_path,
                &raw_vcf,
                overrides.interval_list.as_deref(),
                reference,
            )
            .await;
        if !result.success {
            return stage_failed(Stage::VariantCalling, &result);
        }

        let result = self
            .stages
            .filter_variants(&raw_vcf, &filtered_vcf, reference)
            .await;
        if !result.success {
            return stage_failed(Stage::Filtering, &result);
        }

        let result = self
            .stages
            .annotate_variants(&filtered_vcf, &record.vcf_path, None, reference)
            .await;
        if !result.success {
            return stage_failed(Stage::Annotation, &result);
        }

        RunOutcome::Completed {
            vcf_path: record.vcf_path.clone(),
        }
    }

    async fn finish(
        &self,
        record: &mut AnalysisRecord,
        outcome: &RunOutcome,
    ) -> Result<(), AnalysisError> {
        let finished_at = self.clock.now();
        let description = outcome.describe();

        if outcome.is_success() {
            record.mark_done(finished_at, description)?;
        } else {
            record.mark_failed(finished_at, description)?;
        }

        self.store.save(record).await?;
        Ok(())
    }

    /// Re-fetch the record and fail it, unless it already reached a terminal state
    async fn record_fault(&self, id: Uuid, outcome: &RunOutcome) {
        let mut record = match self.store.find_by_id(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                error!("Analysis {} not found while recording failure", id);
                return;
            }
            Err(err) => {
                error!("Failed to load analysis {} to record failure: {}", id, err);
                return;
            }
        };

        if record.status.is_terminal() {
            warn!(
                "Analysis {} is already {}; not recording failure",
                id, record.status
            );
            return;
        }

        if let Err(err) = self.finish(&mut record, outcome).await {
            error!("Failed to mark analysis {} as failed: {}", id, err);
        }
    }

    /// Get an analysis by ID
    pub async fn get(&self, id: Uuid) -> Result<AnalysisRecord, AnalysisError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(AnalysisError::NotFound(id))
    }

    /// List all analyses
    pub async fn list_all(&self) -> Result<Vec<AnalysisRecord>, AnalysisError> {
        Ok(self.store.list_all().await?)
    }

    /// List analyses for a sample
    pub async fn list_by_sample(
        &self,
        sample_id: Uuid,
    ) -> Result<Vec<AnalysisRecord>, AnalysisError> {
        Ok(self.store.find_by_sample(sample_id).await?)
    }

    /// List analyses by status
    pub async fn list_by_status(
        &self,
        status: AnalysisStatus,
    ) -> Result<Vec<AnalysisRecord>, AnalysisError> {
        Ok(self.store.find_by_status(status).await?)
    }
}

fn stage_failed(stage: Stage, result: &CommandResult) -> RunOutcome {
    RunOutcome::StageFailed {
        stage,
        kind: result.failure.unwrap_or(FailureKind::Stage),
        message: result.error_text().to_string(),
    }
}

fn short_run_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "orchestration task was cancelled".to_string();
    }

    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "orchestration task panicked".to_string()
    }
}
