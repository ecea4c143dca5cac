//! Analysis domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::command::FailureKind;

/// Persisted record of one pipeline run
///
/// Status only ever moves forward (PENDING → RUNNING → DONE | FAILED) and
/// `finished_at` is set exactly when the status is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub sample_id: Uuid,
    pub pipeline_version: String,
    pub status: AnalysisStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub vcf_path: String,
    pub bam_path: String,
    pub log_path: String,
    pub result_summary: Option<String>,
    pub error_message: Option<String>,
}

/// Analysis lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl AnalysisStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisStatus::Done | AnalysisStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// FAILED is reachable from PENDING so that a run which faults before
    /// it starts can still be closed out.
    pub fn can_transition_to(self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Running, Done) | (Running, Failed) | (Pending, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "PENDING",
            AnalysisStatus::Running => "RUNNING",
            AnalysisStatus::Done => "DONE",
            AnalysisStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(AnalysisStatus::Pending),
            "RUNNING" => Ok(AnalysisStatus::Running),
            "DONE" => Ok(AnalysisStatus::Done),
            "FAILED" => Ok(AnalysisStatus::Failed),
            other => Err(format!("Unknown analysis status: {}", other)),
        }
    }
}

/// Rejected status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: AnalysisStatus,
    pub to: AnalysisStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot move analysis from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

impl AnalysisRecord {
    fn transition(&mut self, next: AnalysisStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_running(&mut self) -> Result<(), InvalidTransition> {
        self.transition(AnalysisStatus::Running)
    }

    pub fn mark_done(
        &mut self,
        finished_at: DateTime<Utc>,
        summary: String,
    ) -> Result<(), InvalidTransition> {
        self.transition(AnalysisStatus::Done)?;
        self.finished_at = Some(finished_at);
        self.result_summary = Some(summary);
        Ok(())
    }

    /// Moves the record to FAILED, recording the reason in both the error
    /// message and the summary
    pub fn mark_failed(
        &mut self,
        finished_at: DateTime<Utc>,
        message: String,
    ) -> Result<(), InvalidTransition> {
        self.transition(AnalysisStatus::Failed)?;
        self.finished_at = Some(finished_at);
        self.result_summary = Some(message.clone());
        self.error_message = Some(message);
        Ok(())
    }
}

/// Pipeline stage identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    VariantCalling,
    Filtering,
    Annotation,
}

impl Stage {
    /// Human-readable label used in failure messages
    pub fn label(self) -> &'static str {
        match self {
            Stage::VariantCalling => "Variant calling",
            Stage::Filtering => "Variant filtering",
            Stage::Annotation => "Variant annotation",
        }
    }
}

/// How one orchestration ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Completed {
        vcf_path: String,
    },
    StageFailed {
        stage: Stage,
        kind: FailureKind,
        message: String,
    },
    /// A fault outside any stage result (store error, panic, missing record)
    Aborted {
        message: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    /// The text written to the record when the run ends
    pub fn describe(&self) -> String {
        match self {
            RunOutcome::Completed { vcf_path } => format!(
                "Analysis completed successfully. Found variants in {}",
                vcf_path
            ),
            RunOutcome::StageFailed { stage, message, .. } => {
                format!("{} failed: {}", stage.label(), message)
            }
            RunOutcome::Aborted { message } => {
                format!("Analysis failed with error: {}", message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_record() -> AnalysisRecord {
        AnalysisRecord {
            id: Uuid::new_v4(),
            sample_id: Uuid::new_v4(),
            pipeline_version: "v1".to_string(),
            status: AnalysisStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            vcf_path: "/data/output/S001/abcd1234/S001.vcf".to_string(),
            bam_path: "/data/samples/S001/S001.bam".to_string(),
            log_path: "/data/output/S001/abcd1234/S001.log".to_string(),
            result_summary: None,
            error_message: None,
        }
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        use AnalysisStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Done));
        assert!(Running.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Done));
    }

    #[test]
    fn test_finished_at_set_only_on_terminal() {
        let mut record = pending_record();
        record.mark_running().unwrap();
        assert!(record.finished_at.is_none());

        let finished = record.started_at + Duration::seconds(10);
        record
            .mark_done(finished, "Analysis completed".to_string())
            .unwrap();
        assert_eq!(record.status, AnalysisStatus::Done);
        assert_eq!(record.finished_at, Some(finished));
    }

    #[test]
    fn test_terminal_record_rejects_further_changes() {
        let mut record = pending_record();
        record.mark_running().unwrap();
        record
            .mark_failed(Utc::now(), "Variant calling failed: boom".to_string())
            .unwrap();
        let snapshot = record.clone();

        let err = record
            .mark_failed(Utc::now(), "again".to_string())
            .unwrap_err();
        assert_eq!(err.from, AnalysisStatus::Failed);
        assert_eq!(record, snapshot);
        assert!(record.mark_running().is_err());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            AnalysisStatus::Pending,
            AnalysisStatus::Running,
            AnalysisStatus::Done,
            AnalysisStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<AnalysisStatus>(), Ok(status));
        }
        assert!("QUEUED".parse::<AnalysisStatus>().is_err());
        assert_eq!(
            serde_json::to_value(AnalysisStatus::Running).unwrap(),
            "RUNNING"
        );
    }

    #[test]
    fn test_outcome_descriptions() {
        let failed = RunOutcome::StageFailed {
            stage: Stage::Filtering,
            kind: FailureKind::Stage,
            message: "bad expression".to_string(),
        };
        assert_eq!(failed.describe(), "Variant filtering failed: bad expression");

        let done = RunOutcome::Completed {
            vcf_path: "/out/S001.vcf".to_string(),
        };
        assert!(done.is_success());
        assert!(done.describe().ends_with("/out/S001.vcf"));
    }
}
