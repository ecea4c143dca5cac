//! Analysis DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to create and launch a new analysis for a sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAnalysis {
    pub sample_id: Uuid,
    pub pipeline_version: String,
    /// Aligned reads to call from; defaults to the sample's conventional BAM location
    #[serde(default)]
    pub bam_path: Option<String>,
    /// Reference genome override for every stage
    #[serde(default)]
    pub reference_genome_path: Option<String>,
    /// Interval list restricting variant calling
    #[serde(default)]
    pub interval_list_path: Option<String>,
}

impl CreateAnalysis {
    pub fn new(sample_id: Uuid, pipeline_version: impl Into<String>) -> Self {
        Self {
            sample_id,
            pipeline_version: pipeline_version.into(),
            bam_path: None,
            reference_genome_path: None,
            interval_list_path: None,
        }
    }

    /// Per-run overrides carried into the background orchestration
    pub fn overrides(&self) -> RunOverrides {
        RunOverrides {
            reference_genome: non_blank(&self.reference_genome_path),
            interval_list: non_blank(&self.interval_list_path),
        }
    }
}

/// Optional inputs that are not persisted on the record but steer a single run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOverrides {
    pub reference_genome: Option<String>,
    pub interval_list: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
