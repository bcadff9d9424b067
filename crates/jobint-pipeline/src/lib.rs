//! Batch transformation from scraped job postings to a star-schema warehouse:
//! bronze ingestion, silver cleaning/categorization/skill extraction, gold
//! dimensional modeling and rollups, then an all-or-nothing publish.

use jobint_core::{
    CleanedJobRecord, NormalizedJobRecord, RawJobRecord, RunContext, SkillAssertion, Stage,
    StageReport,
};
use tracing::info_span;

pub mod aggregate;
pub mod categorize;
pub mod cleaning;
pub mod config;
pub mod export;
pub mod modeling;
pub mod reference;
mod run;
pub mod skills;
pub mod validate;

pub use aggregate::Aggregates;
pub use config::PipelineConfig;
pub use export::{ParquetManifest, ParquetManifestFile};
pub use modeling::{StarSchema, UnknownMemberPolicy};
pub use reference::ReferenceData;
pub use run::{report_markdown, Pipeline, RunSummary};
pub use skills::SkillScope;

pub const CRATE_NAME: &str = "jobint-pipeline";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub skill_scope: SkillScope,
    pub unknown_members: UnknownMemberPolicy,
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            skill_scope: config.skill_scope,
            unknown_members: config.unknown_members,
        }
    }
}

/// Everything the stages after ingestion derive from one bronze snapshot.
#[derive(Debug, Clone)]
pub struct LayerOutputs {
    /// All cleaned rows, duplicates included, each with its `dedup_rank`.
    pub cleaned: Vec<CleanedJobRecord>,
    pub normalized: Vec<NormalizedJobRecord>,
    pub skills: Vec<SkillAssertion>,
    pub schema: StarSchema,
    pub aggregates: Aggregates,
    pub reports: Vec<StageReport>,
}

/// Run cleaning, categorization, skill extraction, modeling and aggregation
/// over `raw`, then the data-quality checks. Pure: no I/O, and identical
/// inputs give identical outputs.
pub fn run_stages(
    raw: &[RawJobRecord],
    reference: &ReferenceData,
    ctx: &RunContext,
    options: PipelineOptions,
) -> LayerOutputs {
    let stage_span = |stage: Stage| info_span!("stage", stage = %stage, run_id = %ctx.run_id);

    let cleaned = stage_span(Stage::Cleaning).in_scope(|| cleaning::clean_and_dedup(raw));
    let categorized = stage_span(Stage::Categorization)
        .in_scope(|| categorize::categorize(cleaned.rank_one(), reference));
    let extracted = stage_span(Stage::SkillExtraction).in_scope(|| {
        skills::extract_skills(&categorized.records, &reference.skills, options.skill_scope)
    });
    let modeled = stage_span(Stage::DimensionalModeling).in_scope(|| {
        modeling::build_star_schema(
            &categorized.records,
            &extracted.assertions,
            &reference.skills,
            ctx,
            options.unknown_members,
        )
    });
    let aggregated =
        stage_span(Stage::Aggregation).in_scope(|| aggregate::aggregate(&modeled.schema));
    let validated = stage_span(Stage::Validation)
        .in_scope(|| validate::validate(&cleaned.records, &modeled.schema));

    LayerOutputs {
        cleaned: cleaned.records,
        normalized: categorized.records,
        skills: extracted.assertions,
        schema: modeled.schema,
        aggregates: aggregated.aggregates,
        reports: vec![
            cleaned.report,
            categorized.report,
            extracted.report,
            modeled.report,
            aggregated.report,
            validated,
        ],
    }
}
