//! Post-build data-quality checks over the silver and gold tables. A failed
//! check is logged and counted as a [`RowIssue::ConstraintViolation`]; it never
//! halts the run.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use jobint_core::{CleanedJobRecord, RowIssue, Stage, StageReport};
use tracing::{info, warn};

use crate::modeling::StarSchema;

struct Checks {
    report: StageReport,
}

impl Checks {
    fn violation(&mut self, check: &str, key: &dyn fmt::Debug) {
        warn!(check, key = ?key, "data quality check failed");
        self.report.record(RowIssue::ConstraintViolation);
    }

    fn unique<K>(&mut self, check: &str, keys: impl IntoIterator<Item = K>)
    where
        K: Hash + Eq + fmt::Debug,
    {
        let mut seen = HashSet::new();
        for key in keys {
            if seen.contains(&key) {
                self.violation(check, &key);
            } else {
                seen.insert(key);
            }
        }
    }

    fn resolves(&mut self, check: &str, keys: impl IntoIterator<Item = i64>, known: &HashSet<i64>) {
        for key in keys {
            if !known.contains(&key) {
                self.violation(check, &key);
            }
        }
    }
}

/// Check key uniqueness, foreign-key resolution, bridge containment and the
/// one-rank-1-row-per-natural-key rule.
pub fn validate(cleaned: &[CleanedJobRecord], schema: &StarSchema) -> StageReport {
    let mut report = StageReport::new(Stage::Validation);
    let rows = cleaned.len()
        + schema.dim_time.len()
        + schema.dim_company.len()
        + schema.dim_location.len()
        + schema.dim_skills.len()
        + schema.fact_job_offers.len()
        + schema.fact_job_skills.len();
    report.rows_in = rows as u64;
    report.rows_out = rows as u64;
    let mut checks = Checks { report };

    checks.unique(
        "int_jobs_cleaned.natural_key rank 1",
        cleaned
            .iter()
            .filter(|r| r.dedup_rank == 1)
            .map(|r| r.natural_key.as_str()),
    );

    checks.unique("dim_time.date_id", schema.dim_time.iter().map(|d| d.date_id));
    checks.unique("dim_company.company_id", schema.dim_company.iter().map(|d| d.company_id));
    checks.unique("dim_location.location_id", schema.dim_location.iter().map(|d| d.location_id));
    checks.unique("dim_skills.skill_id", schema.dim_skills.iter().map(|d| d.skill_id));
    checks.unique(
        "fact_job_offers.job_offer_id",
        schema.fact_job_offers.iter().map(|f| f.job_offer_id),
    );
    checks.unique(
        "fact_job_skills.job_skill_id",
        schema.fact_job_skills.iter().map(|f| f.job_skill_id),
    );
    checks.unique(
        "fact_job_skills.(job_offer_id, skill_id)",
        schema
            .fact_job_skills
            .iter()
            .map(|f| (f.job_offer_id, f.skill_id)),
    );

    let dates: HashSet<i64> = schema.dim_time.iter().map(|d| d.date_id).collect();
    let companies: HashSet<i64> = schema.dim_company.iter().map(|d| d.company_id).collect();
    let locations: HashSet<i64> = schema.dim_location.iter().map(|d| d.location_id).collect();
    let skills: HashSet<i64> = schema.dim_skills.iter().map(|d| d.skill_id).collect();
    let offers: HashSet<i64> = schema.fact_job_offers.iter().map(|f| f.job_offer_id).collect();

    let facts = &schema.fact_job_offers;
    checks.resolves(
        "fact_job_offers.company_id -> dim_company",
        facts.iter().map(|f| f.company_id),
        &companies,
    );
    checks.resolves(
        "fact_job_offers.location_id -> dim_location",
        facts.iter().map(|f| f.location_id),
        &locations,
    );
    checks.resolves(
        "fact_job_offers.published_date_id -> dim_time",
        facts.iter().map(|f| f.published_date_id),
        &dates,
    );
    checks.resolves(
        "fact_job_skills.job_offer_id -> fact_job_offers",
        schema.fact_job_skills.iter().map(|f| f.job_offer_id),
        &offers,
    );
    checks.resolves(
        "fact_job_skills.skill_id -> dim_skills",
        schema.fact_job_skills.iter().map(|f| f.skill_id),
        &skills,
    );

    let report = checks.report;
    info!(
        rows = report.rows_in,
        violations = report.count(RowIssue::ConstraintViolation),
        "data quality checks finished"
    );
    report
}
