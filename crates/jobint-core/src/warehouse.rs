//! Gold layer rows: conformed dimensions, facts and rollups.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::vocab::{ContractType, JobCategory, SkillCategory, WorkType};

/// Surrogate key reserved for the explicit "Unknown" member of a dimension.
pub const UNKNOWN_MEMBER_ID: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeDim {
    pub date_id: i64,
    pub date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub quarter: Option<u32>,
    pub week: Option<u32>,
    /// 0 = Sunday.
    pub day_of_week: Option<u32>,
    pub day_name: String,
    pub month_name: String,
    pub quarter_name: String,
    pub month_start: Option<NaiveDate>,
    pub quarter_start: Option<NaiveDate>,
    pub year_start: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyDim {
    pub company_id: i64,
    pub company_name: String,
    pub company_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkLocationType {
    Remote,
    #[serde(rename = "On-site")]
    OnSite,
    Unknown,
}

impl WorkLocationType {
    pub fn label(self) -> &'static str {
        match self {
            WorkLocationType::Remote => "Remote",
            WorkLocationType::OnSite => "On-site",
            WorkLocationType::Unknown => "Unknown",
        }
    }

    pub fn from_work_type(work_type: WorkType) -> Self {
        if work_type.is_remote() {
            WorkLocationType::Remote
        } else {
            WorkLocationType::OnSite
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDim {
    pub location_id: i64,
    pub location_raw: String,
    pub city: String,
    pub country: String,
    pub work_location_type: WorkLocationType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDim {
    pub skill_id: i64,
    pub skill_name: String,
    pub skill_category: SkillCategory,
    pub created_at: DateTime<Utc>,
}

/// One row per rank-1 posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOfferFact {
    pub job_offer_id: i64,
    pub company_id: i64,
    pub location_id: i64,
    pub published_date_id: i64,
    pub job_title: Option<String>,
    pub job_category: JobCategory,
    pub contract_type: ContractType,
    pub work_type: WorkType,
    pub job_url: Option<String>,
    pub company_url: Option<String>,
    pub job_description: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub posted_time: Option<String>,
    pub published_year_month: Option<NaiveDate>,
    pub published_year: Option<i32>,
    pub published_month: Option<u32>,
    pub description_length: u32,
    pub word_count: u32,
    pub is_remote: bool,
    pub is_permanent: bool,
    pub created_at: DateTime<Utc>,
}

/// Bridge row realizing the job offer ↔ skill many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSkillFact {
    pub job_skill_id: i64,
    pub job_offer_id: i64,
    pub skill_id: i64,
    pub skill_name: String,
    pub created_at: DateTime<Utc>,
}

/// Grain: year-month × category × contract type × work type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTimeAggregate {
    pub published_year: Option<i32>,
    pub published_month: Option<u32>,
    pub published_year_month: Option<NaiveDate>,
    pub job_category: JobCategory,
    pub contract_type: ContractType,
    pub work_type: WorkType,
    pub count_job_offers: u64,
    pub count_companies: u64,
    pub avg_description_length: f64,
    pub avg_word_count: f64,
    pub remote_jobs: u64,
    pub permanent_jobs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDemandAggregate {
    pub skill_id: i64,
    pub skill_name: String,
    pub skill_category: SkillCategory,
    pub count_jobs_requiring_skill: u64,
    pub count_companies_requiring_skill: u64,
    pub pct_of_total_jobs: f64,
    pub avg_description_length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationAggregate {
    pub location_id: i64,
    pub location_raw: String,
    pub city: String,
    pub country: String,
    pub work_location_type: WorkLocationType,
    pub count_job_offers: u64,
    pub count_companies: u64,
    pub data_engineer_count: u64,
    pub data_scientist_count: u64,
    pub data_analyst_count: u64,
    pub ml_engineer_count: u64,
    pub pct_remote: f64,
}
