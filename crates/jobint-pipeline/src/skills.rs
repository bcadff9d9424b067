//! Skill extraction: jobs × catalog, filtered by a case-insensitive pattern
//! predicate evaluated against one field at a time.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use jobint_core::{
    JobCategory, MatchedField, NormalizedJobRecord, SkillAssertion, SkillCategory, Stage,
    StageReport,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::reference::{SkillCatalog, SkillEntry};

/// Which posting fields a skill may be detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkillScope {
    #[default]
    Description,
    /// Title is tested separately; a title-only mention still asserts the skill.
    DescriptionAndTitle,
}

impl FromStr for SkillScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "description" => Ok(SkillScope::Description),
            "description-and-title" => Ok(SkillScope::DescriptionAndTitle),
            other => Err(format!(
                "unknown skill scope `{other}` (expected `description` or `description-and-title`)"
            )),
        }
    }
}

impl fmt::Display for SkillScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkillScope::Description => "description",
            SkillScope::DescriptionAndTitle => "description-and-title",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Extracted {
    pub assertions: Vec<SkillAssertion>,
    pub report: StageReport,
}

/// Field in which `skill` is found for `job`, description first.
pub fn matched_field(
    job: &NormalizedJobRecord,
    skill: &SkillEntry,
    scope: SkillScope,
) -> Option<MatchedField> {
    let in_field = |field: &Option<String>| field.as_deref().is_some_and(|text| skill.is_match(text));
    if in_field(&job.job_description_cleaned) {
        Some(MatchedField::Description)
    } else if scope == SkillScope::DescriptionAndTitle && in_field(&job.job_title_cleaned) {
        Some(MatchedField::Title)
    } else {
        None
    }
}

/// Surviving `has_skill = true` assertions, in job order then catalog order.
pub fn extract_skills(
    jobs: &[NormalizedJobRecord],
    catalog: &SkillCatalog,
    scope: SkillScope,
) -> Extracted {
    let mut report = StageReport::new(Stage::SkillExtraction);
    report.rows_in = jobs.len() as u64;

    let assertions: Vec<SkillAssertion> = jobs
        .iter()
        .flat_map(|job| catalog.entries().iter().map(move |skill| (job, skill)))
        .filter_map(|(job, skill)| {
            matched_field(job, skill, scope).map(|matched_in| SkillAssertion {
                natural_key: job.natural_key.clone(),
                skill_name: skill.name.clone(),
                skill_category: skill.category,
                has_skill: true,
                matched_in,
            })
        })
        .collect();

    report.rows_out = assertions.len() as u64;
    info!(
        jobs = jobs.len(),
        catalog = catalog.len(),
        assertions = assertions.len(),
        %scope,
        "skill extraction complete"
    );
    Extracted { assertions, report }
}

/// Silver `int_skills_extraction` row: an assertion with its job's context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillExtractionRow {
    pub natural_key: String,
    pub job_title_cleaned: Option<String>,
    pub location_cleaned: Option<String>,
    pub company_name_cleaned: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub job_category: JobCategory,
    pub skill_name: String,
    pub skill_category: SkillCategory,
    pub has_skill: bool,
    pub matched_in: MatchedField,
}

pub fn skill_extraction_rows(
    jobs: &[NormalizedJobRecord],
    assertions: &[SkillAssertion],
) -> Vec<SkillExtractionRow> {
    let by_key: HashMap<&str, &NormalizedJobRecord> = jobs
        .iter()
        .map(|job| (job.natural_key.as_str(), job))
        .collect();
    assertions
        .iter()
        .filter_map(|assertion| {
            let job = by_key.get(assertion.natural_key.as_str())?;
            Some(SkillExtractionRow {
                natural_key: assertion.natural_key.clone(),
                job_title_cleaned: job.job_title_cleaned.clone(),
                location_cleaned: job.location_cleaned.clone(),
                company_name_cleaned: job.company_name_cleaned.clone(),
                published_date: job.published_date,
                job_category: job.job_category,
                skill_name: assertion.skill_name.clone(),
                skill_category: assertion.skill_category,
                has_skill: assertion.has_skill,
                matched_in: assertion.matched_in,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jobint_core::{ContractType, WorkType};

    use super::*;
    use crate::reference::ReferenceData;

    fn job(key: &str, title: &str, description: Option<&str>) -> NormalizedJobRecord {
        NormalizedJobRecord {
            job_title_cleaned: Some(title.to_string()),
            job_category: JobCategory::DataEngineer,
            contract_type_normalized: ContractType::Permanent,
            work_type_normalized: WorkType::Remote,
            location_cleaned: None,
            company_name_cleaned: None,
            job_description_cleaned: description.map(str::to_string),
            contract_type_cleaned: None,
            work_type_cleaned: None,
            job_url: None,
            company_url: None,
            published_date: None,
            posted_time: None,
            published_year_month: None,
            published_year: None,
            published_month: None,
            natural_key: key.to_string(),
            source_row: 0,
            ingestion_timestamp: Utc::now(),
        }
    }

    fn names(extracted: &Extracted, key: &str) -> Vec<String> {
        extracted
            .assertions
            .iter()
            .filter(|a| a.natural_key == key)
            .map(|a| a.skill_name.clone())
            .collect()
    }

    #[test]
    fn python_and_sql_are_detected() {
        let catalog = ReferenceData::builtin().unwrap().skills;
        let jobs = [job("k1", "senior data engineer", Some("...python and sql required..."))];
        let extracted = extract_skills(&jobs, &catalog, SkillScope::Description);
        assert_eq!(names(&extracted, "k1"), vec!["Python", "SQL"]);
        assert!(extracted.assertions.iter().all(|a| a.has_skill));
    }

    #[test]
    fn word_boundaries_avoid_false_positives() {
        let catalog = ReferenceData::builtin().unwrap().skills;
        let jobs = [job(
            "k1",
            "frontend",
            Some("javascript, nosql-free stack, gitops culture, sparkling water"),
        )];
        let extracted = extract_skills(&jobs, &catalog, SkillScope::Description);
        assert!(names(&extracted, "k1").is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let catalog = ReferenceData::builtin().unwrap().skills;
        let jobs = [job("k1", "x", Some("PySpark on AWS with Power BI"))];
        let extracted = extract_skills(&jobs, &catalog, SkillScope::Description);
        assert_eq!(names(&extracted, "k1"), vec!["Spark", "Power BI", "AWS"]);
    }

    #[test]
    fn title_only_mentions_follow_scope() {
        let catalog = ReferenceData::builtin().unwrap().skills;
        let jobs = [job("k1", "python developer", Some("backend work")), job("k2", "scala", None)];

        let description_only = extract_skills(&jobs, &catalog, SkillScope::Description);
        assert!(description_only.assertions.is_empty());

        let with_title = extract_skills(&jobs, &catalog, SkillScope::DescriptionAndTitle);
        assert_eq!(names(&with_title, "k1"), vec!["Python"]);
        assert_eq!(names(&with_title, "k2"), vec!["Scala"]);
        assert!(with_title
            .assertions
            .iter()
            .all(|a| a.matched_in == MatchedField::Title));
    }

    #[test]
    fn fields_are_never_concatenated() {
        // "power" ends the title and "bi" starts the description
        let catalog = ReferenceData::builtin().unwrap().skills;
        let jobs = [job("k1", "power", Some("bi reporting"))];
        let extracted = extract_skills(&jobs, &catalog, SkillScope::DescriptionAndTitle);
        assert!(extracted.assertions.is_empty());
    }

    #[test]
    fn scope_parses_from_config_strings() {
        assert_eq!(
            "description".parse::<SkillScope>(),
            Ok(SkillScope::Description)
        );
        assert_eq!(
            "Description_And_Title".parse::<SkillScope>(),
            Ok(SkillScope::DescriptionAndTitle)
        );
        assert!("everywhere".parse::<SkillScope>().is_err());
    }

    #[test]
    fn extraction_rows_carry_job_context() {
        let catalog = ReferenceData::builtin().unwrap().skills;
        let jobs = [job("k1", "data engineer", Some("docker"))];
        let extracted = extract_skills(&jobs, &catalog, SkillScope::Description);
        let rows = skill_extraction_rows(&jobs, &extracted.assertions);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].skill_name, "Docker");
        assert_eq!(rows[0].job_title_cleaned.as_deref(), Some("data engineer"));
        assert_eq!(rows[0].skill_category, SkillCategory::DataOpsDevOps);
    }
}
