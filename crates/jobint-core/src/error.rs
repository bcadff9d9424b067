use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Cleaning,
    Categorization,
    SkillExtraction,
    DimensionalModeling,
    Aggregation,
    Validation,
    Publish,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Ingestion => "ingestion",
            Stage::Cleaning => "cleaning",
            Stage::Categorization => "categorization",
            Stage::SkillExtraction => "skill_extraction",
            Stage::DimensionalModeling => "dimensional_modeling",
            Stage::Aggregation => "aggregation",
            Stage::Validation => "validation",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run-fatal failures. Row-level problems are never raised; see [`RowIssue`].
#[derive(Debug, Error)]
pub enum JobintError {
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("source schema mismatch: missing columns [{}]", .missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },
    #[error("reference data error: {0}")]
    ReferenceData(String),
    #[error("stage `{stage}` halted: {source:#}")]
    Stage {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl JobintError {
    pub fn stage(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        Self::Stage {
            stage,
            source: source.into(),
        }
    }

    /// The stage that halted the run, when known.
    pub fn halted_stage(&self) -> Option<Stage> {
        match self {
            JobintError::SourceNotFound(_) | JobintError::SchemaMismatch { .. } => {
                Some(Stage::Ingestion)
            }
            JobintError::Stage { stage, .. } => Some(*stage),
            JobintError::ReferenceData(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, JobintError>;

/// Row-level outcomes absorbed by a stage and resolved to a sentinel or exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssue {
    MalformedRow,
    EmptyRow,
    UnparseableDate,
    DuplicateDropped,
    NoRuleMatch,
    UnparseableLocation,
    ReferentialGap,
    /// A post-build data-quality check failed for this row.
    ConstraintViolation,
}

/// Per-stage row accounting, surfaced in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub rows_in: u64,
    pub rows_out: u64,
    #[serde(default)]
    pub issues: BTreeMap<RowIssue, u64>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            rows_in: 0,
            rows_out: 0,
            issues: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, issue: RowIssue) {
        *self.issues.entry(issue).or_default() += 1;
    }

    pub fn count(&self, issue: RowIssue) -> u64 {
        self.issues.get(&issue).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_names_halted_stage() {
        let err = JobintError::stage(Stage::Publish, anyhow::anyhow!("disk full"));
        assert_eq!(err.halted_stage(), Some(Stage::Publish));
        assert!(err.to_string().contains("`publish` halted"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn schema_mismatch_lists_columns() {
        let err = JobintError::SchemaMismatch {
            missing: vec!["job_url".into(), "work_type".into()],
        };
        assert_eq!(
            err.to_string(),
            "source schema mismatch: missing columns [job_url, work_type]"
        );
        assert_eq!(err.halted_stage(), Some(Stage::Ingestion));
    }

    #[test]
    fn report_counts_issues() {
        let mut report = StageReport::new(Stage::Cleaning);
        report.record(RowIssue::UnparseableDate);
        report.record(RowIssue::UnparseableDate);
        assert_eq!(report.count(RowIssue::UnparseableDate), 2);
        assert_eq!(report.count(RowIssue::NoRuleMatch), 0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["issues"]["unparseable_date"], 2);
    }
}
