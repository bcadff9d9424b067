//! Dimensional modeling: conformed dimensions with first-seen surrogate keys,
//! the job-offer fact table and the job-skill bridge.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use jobint_core::{
    CompanyDim, JobOfferFact, JobSkillFact, LocationDim, NormalizedJobRecord, RowIssue,
    RunContext, SkillAssertion, SkillDim, Stage, StageReport, TimeDim, WorkLocationType,
    UNKNOWN_MEMBER_ID,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::reference::SkillCatalog;

const UNKNOWN: &str = "Unknown";

/// How null dates, companies and locations reach the fact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownMemberPolicy {
    /// Every dimension carries an `Unknown` member with key 0.
    #[default]
    Sentinel,
    /// No sentinel members; unresolvable fact rows are excluded as referential gaps.
    Exclude,
}

impl FromStr for UnknownMemberPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sentinel" | "true" | "1" => Ok(UnknownMemberPolicy::Sentinel),
            "exclude" | "false" | "0" => Ok(UnknownMemberPolicy::Exclude),
            other => Err(format!("unknown member policy `{other}` (expected `sentinel` or `exclude`)")),
        }
    }
}

impl fmt::Display for UnknownMemberPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnknownMemberPolicy::Sentinel => "sentinel",
            UnknownMemberPolicy::Exclude => "exclude",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StarSchema {
    pub dim_time: Vec<TimeDim>,
    pub dim_company: Vec<CompanyDim>,
    pub dim_location: Vec<LocationDim>,
    pub dim_skills: Vec<SkillDim>,
    pub fact_job_offers: Vec<JobOfferFact>,
    pub fact_job_skills: Vec<JobSkillFact>,
}

#[derive(Debug, Clone)]
pub struct Modeled {
    pub schema: StarSchema,
    pub report: StageReport,
}

/// Integer keys handed out in first-seen order, starting at 1.
#[derive(Debug)]
struct SurrogateKeys<K> {
    keys: HashMap<K, i64>,
    next: i64,
}

impl<K: Eq + Hash> SurrogateKeys<K> {
    fn new() -> Self {
        Self {
            keys: HashMap::new(),
            next: 1,
        }
    }

    /// Key for `value`, plus whether it was newly assigned.
    fn assign(&mut self, value: K) -> (i64, bool) {
        if let Some(&key) = self.keys.get(&value) {
            return (key, false);
        }
        let key = self.next;
        self.next += 1;
        self.keys.insert(value, key);
        (key, true)
    }

    fn get<Q>(&self, value: &Q) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.keys.get(value).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLocation {
    pub city: String,
    pub country: String,
    /// False when the raw string was used for both parts.
    pub parsed: bool,
}

/// `"city, [region, ]country"`; anything with fewer than two non-empty
/// comma-separated parts falls back to the raw string.
pub fn parse_location(raw: &str) -> ParsedLocation {
    let parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    match parts.as_slice() {
        [city, .., country] => ParsedLocation {
            city: (*city).to_string(),
            country: (*country).to_string(),
            parsed: true,
        },
        _ => ParsedLocation {
            city: raw.trim().to_string(),
            country: raw.trim().to_string(),
            parsed: false,
        },
    }
}

pub fn description_length(description: Option<&str>) -> u32 {
    description.map_or(0, |d| d.chars().count() as u32)
}

/// Space count + 1, the warehouse's historical word-count convention.
pub fn word_count(description: Option<&str>) -> u32 {
    description.map_or(0, |d| d.matches(' ').count() as u32 + 1)
}

fn time_member(date_id: i64, date: NaiveDate, created_at: DateTime<Utc>) -> TimeDim {
    let quarter = (date.month() - 1) / 3 + 1;
    TimeDim {
        date_id,
        date: Some(date),
        year: Some(date.year()),
        month: Some(date.month()),
        quarter: Some(quarter),
        week: Some(date.iso_week().week()),
        day_of_week: Some(date.weekday().num_days_from_sunday()),
        day_name: date.format("%A").to_string(),
        month_name: date.format("%B").to_string(),
        quarter_name: format!("Q{quarter}"),
        month_start: date.with_day(1),
        quarter_start: NaiveDate::from_ymd_opt(date.year(), (quarter - 1) * 3 + 1, 1),
        year_start: NaiveDate::from_ymd_opt(date.year(), 1, 1),
        created_at,
    }
}

fn unknown_time(created_at: DateTime<Utc>) -> TimeDim {
    TimeDim {
        date_id: UNKNOWN_MEMBER_ID,
        date: None,
        year: None,
        month: None,
        quarter: None,
        week: None,
        day_of_week: None,
        day_name: UNKNOWN.into(),
        month_name: UNKNOWN.into(),
        quarter_name: UNKNOWN.into(),
        month_start: None,
        quarter_start: None,
        year_start: None,
        created_at,
    }
}

/// Resolve a nullable natural value to a key; null only resolves through the sentinel.
fn resolve<K, Q>(keys: &SurrogateKeys<K>, value: Option<&Q>, policy: UnknownMemberPolicy) -> Option<i64>
where
    K: Eq + Hash + Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    match value {
        Some(value) => keys.get(value),
        None if policy == UnknownMemberPolicy::Sentinel => Some(UNKNOWN_MEMBER_ID),
        None => None,
    }
}

/// Build dimensions and facts from rank-1 jobs and surviving skill assertions.
///
/// Keys are assigned over the global distinct-value sets in ascending
/// `source_row` order before any fact row is built, so identical input always
/// yields identical keys. Keys are not carried across runs.
pub fn build_star_schema(
    jobs: &[NormalizedJobRecord],
    assertions: &[SkillAssertion],
    catalog: &SkillCatalog,
    ctx: &RunContext,
    policy: UnknownMemberPolicy,
) -> Modeled {
    let created_at = ctx.started_at;
    let mut report = StageReport::new(Stage::DimensionalModeling);
    report.rows_in = jobs.len() as u64;

    let mut ordered: Vec<&NormalizedJobRecord> = jobs.iter().collect();
    ordered.sort_by_key(|job| job.source_row);

    let mut schema = StarSchema::default();
    let mut time_keys = SurrogateKeys::<NaiveDate>::new();
    let mut company_keys = SurrogateKeys::<String>::new();
    let mut location_keys = SurrogateKeys::<String>::new();
    let mut unparseable_locations: HashSet<String> = HashSet::new();

    if policy == UnknownMemberPolicy::Sentinel {
        schema.dim_time.push(unknown_time(created_at));
        schema.dim_company.push(CompanyDim {
            company_id: UNKNOWN_MEMBER_ID,
            company_name: UNKNOWN.into(),
            company_url: None,
            created_at,
        });
        schema.dim_location.push(LocationDim {
            location_id: UNKNOWN_MEMBER_ID,
            location_raw: UNKNOWN.into(),
            city: UNKNOWN.into(),
            country: UNKNOWN.into(),
            work_location_type: WorkLocationType::Unknown,
            created_at,
        });
    }

    for job in &ordered {
        if let Some(date) = job.published_date {
            let (date_id, new) = time_keys.assign(date);
            if new {
                schema.dim_time.push(time_member(date_id, date, created_at));
            }
        }
        if let Some(name) = &job.company_name_cleaned {
            let (company_id, new) = company_keys.assign(name.clone());
            if new {
                schema.dim_company.push(CompanyDim {
                    company_id,
                    company_name: name.clone(),
                    company_url: job.company_url.clone(),
                    created_at,
                });
            }
        }
        if let Some(raw) = &job.location_cleaned {
            let (location_id, new) = location_keys.assign(raw.clone());
            if new {
                let parsed = parse_location(raw);
                if !parsed.parsed {
                    unparseable_locations.insert(raw.clone());
                }
                schema.dim_location.push(LocationDim {
                    location_id,
                    location_raw: raw.clone(),
                    city: parsed.city,
                    country: parsed.country,
                    work_location_type: WorkLocationType::from_work_type(job.work_type_normalized),
                    created_at,
                });
            }
            if unparseable_locations.contains(raw) {
                report.record(RowIssue::UnparseableLocation);
            }
        }
    }

    let mut skill_keys = SurrogateKeys::<String>::new();
    for entry in catalog.entries() {
        let (skill_id, new) = skill_keys.assign(entry.name.clone());
        if new {
            schema.dim_skills.push(SkillDim {
                skill_id,
                skill_name: entry.name.clone(),
                skill_category: entry.category,
                created_at,
            });
        }
    }

    let mut offer_ids: HashMap<&str, i64> = HashMap::new();
    for job in &ordered {
        let company_id = resolve(&company_keys, job.company_name_cleaned.as_deref(), policy);
        let location_id = resolve(&location_keys, job.location_cleaned.as_deref(), policy);
        let date_id = resolve(&time_keys, job.published_date.as_ref(), policy);
        let (Some(company_id), Some(location_id), Some(published_date_id)) =
            (company_id, location_id, date_id)
        else {
            warn!(
                row = job.source_row,
                company = company_id.is_some(),
                location = location_id.is_some(),
                date = date_id.is_some(),
                "referential gap: job offer excluded from fact table"
            );
            report.record(RowIssue::ReferentialGap);
            continue;
        };

        let job_offer_id = schema.fact_job_offers.len() as i64 + 1;
        offer_ids.insert(job.natural_key.as_str(), job_offer_id);
        let description = job.job_description_cleaned.as_deref();
        schema.fact_job_offers.push(JobOfferFact {
            job_offer_id,
            company_id,
            location_id,
            published_date_id,
            job_title: job.job_title_cleaned.clone(),
            job_category: job.job_category,
            contract_type: job.contract_type_normalized,
            work_type: job.work_type_normalized,
            job_url: job.job_url.clone(),
            company_url: job.company_url.clone(),
            job_description: job.job_description_cleaned.clone(),
            published_date: job.published_date,
            posted_time: job.posted_time.clone(),
            published_year_month: job.published_year_month,
            published_year: job.published_year,
            published_month: job.published_month,
            description_length: description_length(description),
            word_count: word_count(description),
            is_remote: job.work_type_normalized.is_remote(),
            is_permanent: job.contract_type_normalized.is_permanent(),
            created_at,
        });
    }

    let mut bridge: Vec<(i64, i64, &str)> = Vec::with_capacity(assertions.len());
    let mut bridge_gaps = 0u64;
    for assertion in assertions.iter().filter(|a| a.has_skill) {
        let job_offer_id = offer_ids.get(assertion.natural_key.as_str()).copied();
        let skill_id = skill_keys.get(assertion.skill_name.as_str());
        match (job_offer_id, skill_id) {
            (Some(job_offer_id), Some(skill_id)) => {
                bridge.push((job_offer_id, skill_id, assertion.skill_name.as_str()))
            }
            _ => {
                bridge_gaps += 1;
                report.record(RowIssue::ReferentialGap);
            }
        }
    }
    if bridge_gaps > 0 {
        warn!(excluded = bridge_gaps, "referential gap: skill assertions without a job offer or skill");
    }
    bridge.sort_by_key(|&(job_offer_id, skill_id, _)| (job_offer_id, skill_id));
    bridge.dedup_by_key(|&mut (job_offer_id, skill_id, _)| (job_offer_id, skill_id));
    schema.fact_job_skills = bridge
        .into_iter()
        .enumerate()
        .map(|(idx, (job_offer_id, skill_id, skill_name))| JobSkillFact {
            job_skill_id: idx as i64 + 1,
            job_offer_id,
            skill_id,
            skill_name: skill_name.to_string(),
            created_at,
        })
        .collect();

    report.rows_out = schema.fact_job_offers.len() as u64;
    info!(
        dim_time = schema.dim_time.len(),
        dim_company = schema.dim_company.len(),
        dim_location = schema.dim_location.len(),
        dim_skills = schema.dim_skills.len(),
        fact_job_offers = schema.fact_job_offers.len(),
        fact_job_skills = schema.fact_job_skills.len(),
        %policy,
        "dimensional modeling complete"
    );
    Modeled { schema, report }
}
