//! Core domain model for the job-offer warehouse: layer records, closed
//! vocabularies, run context and the error taxonomy shared by every stage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod error;
mod vocab;
mod warehouse;

pub use error::{JobintError, Result, RowIssue, Stage, StageReport};
pub use vocab::{ContractType, JobCategory, MatchedField, SkillCategory, WorkType};
pub use warehouse::{
    CategoryTimeAggregate, CompanyDim, JobOfferFact, JobSkillFact, LocationAggregate, LocationDim,
    SkillDemandAggregate, SkillDim, TimeDim, WorkLocationType, UNKNOWN_MEMBER_ID,
};

pub const CRATE_NAME: &str = "jobint-core";

/// Run-scoped metadata handed to every stage instead of reading clocks or ids ambiently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// Context with caller-supplied identity, used for reproducible runs.
    pub fn fixed(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self { run_id, started_at }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// One scraped posting exactly as sourced (bronze layer, `stg_jobs_raw`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJobRecord {
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub posted_time: Option<String>,
    pub published_at: Option<String>,
    pub job_url: Option<String>,
    pub company_name: Option<String>,
    pub company_url: Option<String>,
    pub job_description: Option<String>,
    pub contract_type: Option<String>,
    pub work_type: Option<String>,
    pub ingestion_timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub source_row: u64,
}

impl RawJobRecord {
    /// True when none of the ten business columns carries a value.
    pub fn is_structurally_empty(&self) -> bool {
        [
            &self.job_title,
            &self.location,
            &self.posted_time,
            &self.published_at,
            &self.job_url,
            &self.company_name,
            &self.company_url,
            &self.job_description,
            &self.contract_type,
            &self.work_type,
        ]
        .iter()
        .all(|field| field.as_deref().map_or(true, |v| v.trim().is_empty()))
    }
}

/// Silver layer `int_jobs_cleaned`: text normalized, dates typed, dedup-ranked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedJobRecord {
    pub job_title_cleaned: Option<String>,
    pub location_cleaned: Option<String>,
    pub company_name_cleaned: Option<String>,
    pub job_description_cleaned: Option<String>,
    pub contract_type_cleaned: Option<String>,
    pub work_type_cleaned: Option<String>,
    pub job_url: Option<String>,
    pub company_url: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub posted_time: Option<String>,
    pub published_year_month: Option<NaiveDate>,
    pub published_year: Option<i32>,
    pub published_month: Option<u32>,
    pub natural_key: String,
    pub dedup_rank: u32,
    pub source_row: u64,
    pub ingestion_timestamp: DateTime<Utc>,
}

/// Silver layer `int_job_title_normalization`: rank-1 cleaned rows plus the
/// three closed-vocabulary attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedJobRecord {
    pub job_title_cleaned: Option<String>,
    pub job_category: JobCategory,
    pub contract_type_normalized: ContractType,
    pub work_type_normalized: WorkType,
    pub location_cleaned: Option<String>,
    pub company_name_cleaned: Option<String>,
    pub job_description_cleaned: Option<String>,
    pub contract_type_cleaned: Option<String>,
    pub work_type_cleaned: Option<String>,
    pub job_url: Option<String>,
    pub company_url: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub posted_time: Option<String>,
    pub published_year_month: Option<NaiveDate>,
    pub published_year: Option<i32>,
    pub published_month: Option<u32>,
    pub natural_key: String,
    pub source_row: u64,
    pub ingestion_timestamp: DateTime<Utc>,
}

impl NormalizedJobRecord {
    pub fn from_cleaned(
        cleaned: CleanedJobRecord,
        job_category: JobCategory,
        contract_type_normalized: ContractType,
        work_type_normalized: WorkType,
    ) -> Self {
        Self {
            job_title_cleaned: cleaned.job_title_cleaned,
            job_category,
            contract_type_normalized,
            work_type_normalized,
            location_cleaned: cleaned.location_cleaned,
            company_name_cleaned: cleaned.company_name_cleaned,
            job_description_cleaned: cleaned.job_description_cleaned,
            contract_type_cleaned: cleaned.contract_type_cleaned,
            work_type_cleaned: cleaned.work_type_cleaned,
            job_url: cleaned.job_url,
            company_url: cleaned.company_url,
            published_date: cleaned.published_date,
            posted_time: cleaned.posted_time,
            published_year_month: cleaned.published_year_month,
            published_year: cleaned.published_year,
            published_month: cleaned.published_month,
            natural_key: cleaned.natural_key,
            source_row: cleaned.source_row,
            ingestion_timestamp: cleaned.ingestion_timestamp,
        }
    }
}

/// `(job natural key, skill, has_skill)` triple from the jobs × catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillAssertion {
    pub natural_key: String,
    pub skill_name: String,
    pub skill_category: SkillCategory,
    pub has_skill: bool,
    pub matched_in: MatchedField,
}
