//! Categorization: closed-vocabulary labels for title, contract type and work type.

use jobint_core::{
    CleanedJobRecord, JobCategory, NormalizedJobRecord, RowIssue, Stage, StageReport,
};
use tracing::info;

use crate::reference::{ReferenceData, RuleSet};

#[derive(Debug, Clone)]
pub struct Categorized {
    pub records: Vec<NormalizedJobRecord>,
    pub report: StageReport,
}

/// Total over all strings: anything unmatched is `Other Data Role`.
pub fn categorize_title(rules: &RuleSet<JobCategory>, title: &str) -> JobCategory {
    rules.classify(Some(title)).label
}

/// Label rank-1 cleaned records. Each fallback resolution is counted as a
/// `NoRuleMatch` outcome; none of them is an error.
pub fn categorize<'a>(
    rank_one: impl IntoIterator<Item = &'a CleanedJobRecord>,
    reference: &ReferenceData,
) -> Categorized {
    let mut report = StageReport::new(Stage::Categorization);
    let mut records = Vec::new();

    for cleaned in rank_one {
        report.rows_in += 1;
        let category = reference
            .categories
            .classify(cleaned.job_title_cleaned.as_deref());
        let contract = reference
            .contract_types
            .classify(cleaned.contract_type_cleaned.as_deref());
        let work = reference
            .work_types
            .classify(cleaned.work_type_cleaned.as_deref());

        for matched in [category.matched, contract.matched, work.matched] {
            if !matched {
                report.record(RowIssue::NoRuleMatch);
            }
        }

        records.push(NormalizedJobRecord::from_cleaned(
            cleaned.clone(),
            category.label,
            contract.label,
            work.label,
        ));
    }

    report.rows_out = records.len() as u64;
    info!(
        rows = report.rows_out,
        defaults = report.count(RowIssue::NoRuleMatch),
        "categorization complete"
    );
    Categorized { records, report }
}
