//! Runner configuration
//!
//! Defines the container runtime settings used by the executor and the
//! defaults consumed by the stage builders. Both are built once at startup
//! and injected; nothing here is read from globals afterwards.

use std::time::Duration;

/// Default wall-clock budget for a single tool invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Container runtime configuration for the executor
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Container runtime executable (e.g., "docker" or "podman")
    pub runtime: String,

    /// Toolkit image (e.g., "broadinstitute/gatk:4.5.0.0")
    pub image: String,

    /// Host side of the data volume mount
    pub host_volume: String,

    /// Container side of the data volume mount
    pub container_volume: String,

    /// Working directory inside the container
    pub working_dir: String,

    /// Wrapper executable inside the image that receives the command line
    pub tool_wrapper: String,

    /// Maximum time a single invocation may run before it is killed
    pub command_timeout: Duration,
}

impl RunnerConfig {
    /// Creates a configuration with defaults for the given image
    pub fn new(image: String) -> Self {
        Self {
            runtime: "docker".to_string(),
            image,
            host_volume: "./data".to_string(),
            container_volume: "/data".to_string(),
            working_dir: "/data".to_string(),
            tool_wrapper: "gatk".to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - CONTAINER_RUNTIME (default: docker)
    /// - GATK_IMAGE (default: broadinstitute/gatk:4.5.0.0)
    /// - GATK_DATA_VOLUME_HOST (default: ./data)
    /// - GATK_DATA_VOLUME (default: /data)
    /// - GATK_WORKDIR (default: the container data volume)
    /// - GATK_TOOL_WRAPPER (default: gatk)
    /// - COMMAND_TIMEOUT (seconds, default: 1800)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let container_volume =
            std::env::var("GATK_DATA_VOLUME").unwrap_or(defaults.container_volume);

        let command_timeout = match std::env::var("COMMAND_TIMEOUT") {
            Ok(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| anyhow::anyhow!("COMMAND_TIMEOUT must be a number of seconds"))?,
            Err(_) => defaults.command_timeout,
        };

        Ok(Self {
            runtime: std::env::var("CONTAINER_RUNTIME").unwrap_or(defaults.runtime),
            image: std::env::var("GATK_IMAGE").unwrap_or(defaults.image),
            host_volume: std::env::var("GATK_DATA_VOLUME_HOST").unwrap_or(defaults.host_volume),
            working_dir: std::env::var("GATK_WORKDIR").unwrap_or_else(|_| container_volume.clone()),
            container_volume,
            tool_wrapper: std::env::var("GATK_TOOL_WRAPPER").unwrap_or(defaults.tool_wrapper),
            command_timeout,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runtime.is_empty() {
            anyhow::bail!("runtime cannot be empty");
        }

        if self.image.is_empty() {
            anyhow::bail!("image cannot be empty");
        }

        if self.host_volume.is_empty() || self.container_volume.is_empty() {
            anyhow::bail!("data volume mapping must name both host and container paths");
        }

        if !self.container_volume.starts_with('/') {
            anyhow::bail!("container_volume must be an absolute path");
        }

        if self.tool_wrapper.is_empty() {
            anyhow::bail!("tool_wrapper cannot be empty");
        }

        if self.command_timeout.is_zero() {
            anyhow::bail!("command_timeout must be greater than 0");
        }

        Ok(())
    }

    /// `<host>:<container>` argument for the volume flag
    pub fn volume_mapping(&self) -> String {
        format!("{}:{}", self.host_volume, self.container_volume)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new("broadinstitute/gatk:4.5.0.0".to_string())
    }
}

/// Defaults for the stage builders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    /// Reference genome used when a run does not override it
    pub reference_genome: String,

    /// Funcotator data sources used by the annotation stage
    pub funcotator_data_sources: String,
}

impl StageConfig {
    /// Creates stage configuration from environment variables
    ///
    /// - REFERENCE_GENOME (default: /data/reference/Homo_sapiens_assembly38.fasta)
    /// - FUNCOTATOR_DATA_SOURCES (default: /data/funcotator_dataSources)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reference_genome: std::env::var("REFERENCE_GENOME")
                .unwrap_or(defaults.reference_genome),
            funcotator_data_sources: std::env::var("FUNCOTATOR_DATA_SOURCES")
                .unwrap_or(defaults.funcotator_data_sources),
        }
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            reference_genome: "/data/reference/Homo_sapiens_assembly38.fasta".to_string(),
            funcotator_data_sources: "/data/funcotator_dataSources".to_string(),
        }
    }
}
