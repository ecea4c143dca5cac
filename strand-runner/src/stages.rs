//! GATK stage builders
//!
//! Each stage turns its inputs into a [`CommandDescriptor`] with a fixed
//! parameter set and hands it to the injected [`CommandRunner`]. The result
//! is returned untouched; stages have no other side effects.

use std::sync::Arc;
use strand_core::domain::command::{CommandDescriptor, CommandParameter, CommandResult};
use tracing::{error, info};

use crate::config::StageConfig;
use crate::container::CommandRunner;

/// Hard filters applied by the filtering stage, as (expression, name) pairs
const HARD_FILTERS: [(&str, &str); 3] = [
    ("QD < 2.0", "QD2"),
    ("FS > 60.0", "FS60"),
    ("MQ < 40.0", "MQ40"),
];

/// Variant classes accepted by `SelectVariants --select-type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantType {
    Snp,
    Indel,
    Mixed,
    Mnp,
    Symbolic,
    NoVariation,
}

impl VariantType {
    pub fn as_str(self) -> &'static str {
        match self {
            VariantType::Snp => "SNP",
            VariantType::Indel => "INDEL",
            VariantType::Mixed => "MIXED",
            VariantType::Mnp => "MNP",
            VariantType::Symbolic => "SYMBOLIC",
            VariantType::NoVariation => "NO_VARIATION",
        }
    }
}

/// Stage builders bound to one runner and one set of defaults
#[derive(Clone)]
pub struct GatkStages {
    runner: Arc<dyn CommandRunner>,
    config: StageConfig,
}

impl GatkStages {
    pub fn new(runner: Arc<dyn CommandRunner>, config: StageConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    fn reference<'a>(&'a self, reference_override: Option<&'a str>) -> &'a str {
        reference_override
            .filter(|r| !r.is_empty())
            .unwrap_or(self.config.reference_genome.as_str())
    }

    /// HaplotypeCaller invocation, optionally restricted to an interval list
    pub fn variant_calling_command(
        &self,
        bam_file: &str,
        output_vcf: &str,
        interval_list: Option<&str>,
        reference_override: Option<&str>,
    ) -> CommandDescriptor {
        let mut builder = CommandDescriptor::builder("HaplotypeCaller")
            .reference(self.reference(reference_override))
            .input(bam_file)
            .output(output_vcf);

        if let Some(intervals) = interval_list.filter(|i| !i.is_empty()) {
            builder = builder.parameter(CommandParameter::option("-L", intervals));
        }

        builder
            .parameter(CommandParameter::option("--emit-ref-confidence", "GVCF"))
            .parameter(CommandParameter::option("--pcr-indel-model", "NONE"))
            .parameter(CommandParameter::option(
                "--standard-min-confidence-threshold-for-calling",
                "30",
            ))
            .build()
    }

    /// VariantFiltration invocation applying the standard hard filters
    pub fn filtering_command(
        &self,
        input_vcf: &str,
        output_vcf: &str,
        reference_override: Option<&str>,
    ) -> CommandDescriptor {
        let filters = HARD_FILTERS.iter().flat_map(|(expression, name)| {
            [
                CommandParameter::option("--filter-expression", format!("\"{}\"", expression)),
                CommandParameter::option("--filter-name", format!("\"{}\"", name)),
            ]
        });

        CommandDescriptor::builder("VariantFiltration")
            .reference(self.reference(reference_override))
            .input(input_vcf)
            .output(output_vcf)
            .parameters(filters)
            .build()
    }

    /// Funcotator invocation producing an annotated VCF
    pub fn annotation_command(
        &self,
        input_vcf: &str,
        output_vcf: &str,
        data_sources_override: Option<&str>,
        reference_override: Option<&str>,
    ) -> CommandDescriptor {
        let data_sources = data_sources_override
            .filter(|d| !d.is_empty())
            .unwrap_or(self.config.funcotator_data_sources.as_str());

        CommandDescriptor::builder("Funcotator")
            .reference(self.reference(reference_override))
            .input(input_vcf)
            .output(output_vcf)
            .parameter(CommandParameter::option("--data-sources-path", data_sources))
            .parameter(CommandParameter::option("--ref-version", "hg38"))
            .parameter(CommandParameter::option("--output-file-format", "VCF"))
            .build()
    }

    /// GenotypeGVCFs invocation over several GVCFs
    ///
    /// GVCFs are passed with `-V`, so the descriptor has no `-I` inputs.
    pub fn joint_genotyping_command(
        &self,
        gvcf_files: &[String],
        output_vcf: &str,
        reference_override: Option<&str>,
    ) -> CommandDescriptor {
        CommandDescriptor::builder("GenotypeGVCFs")
            .reference(self.reference(reference_override))
            .output(output_vcf)
            .parameters(
                gvcf_files
                    .iter()
                    .map(|gvcf| CommandParameter::option("-V", gvcf.as_str())),
            )
            .build()
    }

    /// SelectVariants invocation keeping one variant class
    pub fn select_variants_command(
        &self,
        input_vcf: &str,
        output_vcf: &str,
        variant_type: VariantType,
        reference_override: Option<&str>,
    ) -> CommandDescriptor {
        CommandDescriptor::builder("SelectVariants")
            .reference(self.reference(reference_override))
            .input(input_vcf)
            .output(output_vcf)
            .parameter(CommandParameter::option("--select-type", variant_type.as_str()))
            .build()
    }

    pub async fn call_variants(
        &self,
        bam_file: &str,
        output_vcf: &str,
        interval_list: Option<&str>,
        reference_override: Option<&str>,
    ) -> CommandResult {
        info!("Starting variant calling for BAM file: {}", bam_file);
        let command =
            self.variant_calling_command(bam_file, output_vcf, interval_list, reference_override);
        self.run("Variant calling", command, output_vcf).await
    }

    pub async fn filter_variants(
        &self,
        input_vcf: &str,
        output_vcf: &str,
        reference_override: Option<&str>,
    ) -> CommandResult {
        info!("Starting variant filtering for VCF file: {}", input_vcf);
        let command = self.filtering_command(input_vcf, output_vcf, reference_override);
        self.run("Variant filtering", command, output_vcf).await
    }

    pub async fn annotate_variants(
        &self,
        input_vcf: &str,
        output_vcf: &str,
        data_sources_override: Option<&str>,
        reference_override: Option<&str>,
    ) -> CommandResult {
        info!("Starting variant annotation for VCF file: {}", input_vcf);
        let command = self.annotation_command(
            input_vcf,
            output_vcf,
            data_sources_override,
            reference_override,
        );
        self.run("Variant annotation", command, output_vcf).await
    }

    pub async fn joint_genotyping(
        &self,
        gvcf_files: &[String],
        output_vcf: &str,
        reference_override: Option<&str>,
    ) -> CommandResult {
        info!("Starting joint genotyping for {} GVCF files", gvcf_files.len());
        let command = self.joint_genotyping_command(gvcf_files, output_vcf, reference_override);
        self.run("Joint genotyping", command, output_vcf).await
    }

    pub async fn select_variants_by_type(
        &self,
        input_vcf: &str,
        output_vcf: &str,
        variant_type: VariantType,
        reference_override: Option<&str>,
    ) -> CommandResult {
        info!(
            "Selecting {} variants from VCF file: {}",
            variant_type.as_str(),
            input_vcf
        );
        let command =
            self.select_variants_command(input_vcf, output_vcf, variant_type, reference_override);
        self.run("Variant selection", command, output_vcf).await
    }

    async fn run(&self, label: &str, command: CommandDescriptor, output_vcf: &str) -> CommandResult {
        let result = self.runner.execute(command).await;

        if result.success {
            info!("{} completed successfully. Output VCF: {}", label, output_vcf);
        } else {
            error!("{} failed: {}", label, result.error_text());
        }

        result
    }
}
