//! Aggregation: gold rollups computed from the fact and dimension tables only.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use jobint_core::{
    CategoryTimeAggregate, ContractType, JobCategory, JobOfferFact, LocationAggregate,
    SkillDemandAggregate, Stage, StageReport, WorkType, UNKNOWN_MEMBER_ID,
};
use tracing::info;

use crate::modeling::StarSchema;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    pub by_category_time: Vec<CategoryTimeAggregate>,
    pub skills_demand: Vec<SkillDemandAggregate>,
    pub location_analysis: Vec<LocationAggregate>,
}

impl Aggregates {
    pub fn row_count(&self) -> usize {
        self.by_category_time.len() + self.skills_demand.len() + self.location_analysis.len()
    }
}

#[derive(Debug, Clone)]
pub struct Aggregated {
    pub aggregates: Aggregates,
    pub report: StageReport,
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(sum: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        round2(sum as f64 / count as f64)
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(100.0 * part as f64 / whole as f64)
    }
}

/// Running totals over a group of job offers.
#[derive(Debug, Default)]
struct OfferTotals {
    offers: u64,
    companies: BTreeSet<i64>,
    description_length: u64,
    word_count: u64,
    remote: u64,
    permanent: u64,
}

impl OfferTotals {
    fn add(&mut self, fact: &JobOfferFact) {
        self.offers += 1;
        // the Unknown member is not a company
        if fact.company_id != UNKNOWN_MEMBER_ID {
            self.companies.insert(fact.company_id);
        }
        self.description_length += u64::from(fact.description_length);
        self.word_count += u64::from(fact.word_count);
        self.remote += u64::from(fact.is_remote);
        self.permanent += u64::from(fact.is_permanent);
    }
}

type CategoryTimeKey = (
    Option<i32>,
    Option<u32>,
    Option<NaiveDate>,
    JobCategory,
    ContractType,
    WorkType,
);

pub fn category_time_rollup(schema: &StarSchema) -> Vec<CategoryTimeAggregate> {
    let mut groups: BTreeMap<CategoryTimeKey, OfferTotals> = BTreeMap::new();
    for fact in &schema.fact_job_offers {
        let key = (
            fact.published_year,
            fact.published_month,
            fact.published_year_month,
            fact.job_category,
            fact.contract_type,
            fact.work_type,
        );
        groups.entry(key).or_default().add(fact);
    }

    groups
        .into_iter()
        .map(|((year, month, year_month, category, contract, work), totals)| {
            CategoryTimeAggregate {
                published_year: year,
                published_month: month,
                published_year_month: year_month,
                job_category: category,
                contract_type: contract,
                work_type: work,
                count_job_offers: totals.offers,
                count_companies: totals.companies.len() as u64,
                avg_description_length: mean(totals.description_length, totals.offers),
                avg_word_count: mean(totals.word_count, totals.offers),
                remote_jobs: totals.remote,
                permanent_jobs: totals.permanent,
            }
        })
        .collect()
}

/// One row per skill with at least one bridge row, most demanded first.
pub fn skills_demand_rollup(schema: &StarSchema) -> Vec<SkillDemandAggregate> {
    let offers: HashMap<i64, &JobOfferFact> = schema
        .fact_job_offers
        .iter()
        .map(|fact| (fact.job_offer_id, fact))
        .collect();
    let total_offers = schema.fact_job_offers.len() as u64;

    let mut by_skill: HashMap<i64, OfferTotals> = HashMap::new();
    for bridge in &schema.fact_job_skills {
        if let Some(fact) = offers.get(&bridge.job_offer_id) {
            by_skill.entry(bridge.skill_id).or_default().add(fact);
        }
    }

    let mut rows: Vec<SkillDemandAggregate> = schema
        .dim_skills
        .iter()
        .filter_map(|skill| {
            let totals = by_skill.get(&skill.skill_id)?;
            Some(SkillDemandAggregate {
                skill_id: skill.skill_id,
                skill_name: skill.skill_name.clone(),
                skill_category: skill.skill_category,
                count_jobs_requiring_skill: totals.offers,
                count_companies_requiring_skill: totals.companies.len() as u64,
                pct_of_total_jobs: percent(totals.offers, total_offers),
                avg_description_length: mean(totals.description_length, totals.offers),
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.count_jobs_requiring_skill
            .cmp(&a.count_jobs_requiring_skill)
            .then_with(|| a.skill_id.cmp(&b.skill_id))
    });
    rows
}

#[derive(Debug, Default)]
struct LocationTotals {
    offers: OfferTotals,
    by_category: BTreeMap<JobCategory, u64>,
}

/// One row per location referenced by at least one job offer, busiest first.
pub fn location_rollup(schema: &StarSchema) -> Vec<LocationAggregate> {
    let mut by_location: HashMap<i64, LocationTotals> = HashMap::new();
    for fact in &schema.fact_job_offers {
        let totals = by_location.entry(fact.location_id).or_default();
        totals.offers.add(fact);
        *totals.by_category.entry(fact.job_category).or_default() += 1;
    }

    let mut rows: Vec<LocationAggregate> = schema
        .dim_location
        .iter()
        .filter_map(|location| {
            let totals = by_location.get(&location.location_id)?;
            let in_category = |category: JobCategory| totals.by_category.get(&category).copied().unwrap_or(0);
            Some(LocationAggregate {
                location_id: location.location_id,
                location_raw: location.location_raw.clone(),
                city: location.city.clone(),
                country: location.country.clone(),
                work_location_type: location.work_location_type,
                count_job_offers: totals.offers.offers,
                count_companies: totals.offers.companies.len() as u64,
                data_engineer_count: in_category(JobCategory::DataEngineer),
                data_scientist_count: in_category(JobCategory::DataScientist),
                data_analyst_count: in_category(JobCategory::DataAnalyst),
                ml_engineer_count: in_category(JobCategory::MlEngineer),
                pct_remote: percent(totals.offers.remote, totals.offers.offers),
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.count_job_offers
            .cmp(&a.count_job_offers)
            .then_with(|| a.location_id.cmp(&b.location_id))
    });
    rows
}

pub fn aggregate(schema: &StarSchema) -> Aggregated {
    let mut report = StageReport::new(Stage::Aggregation);
    report.rows_in = schema.fact_job_offers.len() as u64;

    let aggregates = Aggregates {
        by_category_time: category_time_rollup(schema),
        skills_demand: skills_demand_rollup(schema),
        location_analysis: location_rollup(schema),
    };
    report.rows_out = aggregates.row_count() as u64;
    info!(
        category_time = aggregates.by_category_time.len(),
        skills_demand = aggregates.skills_demand.len(),
        locations = aggregates.location_analysis.len(),
        "aggregation complete"
    );
    Aggregated { aggregates, report }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use jobint_core::{JobSkillFact, LocationDim, SkillCategory, SkillDim, WorkLocationType};

    use super::*;

    fn created_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-07T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn fact(id: i64, company_id: i64, location_id: i64, date: Option<NaiveDate>) -> JobOfferFact {
        JobOfferFact {
            job_offer_id: id,
            company_id,
            location_id,
            published_date_id: if date.is_some() { 1 } else { UNKNOWN_MEMBER_ID },
            job_title: Some("data engineer".into()),
            job_category: JobCategory::DataEngineer,
            contract_type: ContractType::Permanent,
            work_type: WorkType::Remote,
            job_url: None,
            company_url: None,
            job_description: Some("python and sql".into()),
            published_date: date,
            posted_time: None,
            published_year_month: date.and_then(|_| NaiveDate::from_ymd_opt(2024, 3, 1)),
            published_year: date.map(|_| 2024),
            published_month: date.map(|_| 3),
            description_length: 14,
            word_count: 3,
            is_remote: true,
            is_permanent: true,
            created_at: created_at(),
        }
    }

    fn skill(id: i64, name: &str) -> SkillDim {
        SkillDim {
            skill_id: id,
            skill_name: name.into(),
            skill_category: SkillCategory::ProgrammingLanguage,
            created_at: created_at(),
        }
    }

    fn bridge(id: i64, offer: i64, skill: i64) -> JobSkillFact {
        JobSkillFact {
            job_skill_id: id,
            job_offer_id: offer,
            skill_id: skill,
            skill_name: String::new(),
            created_at: created_at(),
        }
    }

    fn location(id: i64, raw: &str) -> LocationDim {
        LocationDim {
            location_id: id,
            location_raw: raw.into(),
            city: raw.into(),
            country: raw.into(),
            work_location_type: WorkLocationType::Remote,
            created_at: created_at(),
        }
    }

    fn schema() -> StarSchema {
        let march = NaiveDate::from_ymd_opt(2024, 3, 15);
        let mut onsite = fact(3, 2, 2, march);
        onsite.is_remote = false;
        onsite.work_type = WorkType::OnSite;
        onsite.job_category = JobCategory::DataAnalyst;
        onsite.description_length = 7;
        onsite.word_count = 2;
        StarSchema {
            dim_location: vec![location(0, "Unknown"), location(1, "paris"), location(2, "lyon")],
            dim_skills: vec![skill(1, "Python"), skill(2, "SQL"), skill(3, "Scala")],
            fact_job_offers: vec![
                fact(1, 1, 1, march),
                fact(2, UNKNOWN_MEMBER_ID, 1, None),
                onsite,
            ],
            fact_job_skills: vec![bridge(1, 1, 1), bridge(2, 1, 2), bridge(3, 2, 2), bridge(4, 3, 2)],
            ..StarSchema::default()
        }
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(2.344), 2.34);
        assert_eq!(round2(10.0 / 3.0), 3.33);
    }

    #[test]
    fn category_time_counts_sum_to_fact_count() {
        let schema = schema();
        let rows = category_time_rollup(&schema);
        let total: u64 = rows.iter().map(|r| r.count_job_offers).sum();
        assert_eq!(total, schema.fact_job_offers.len() as u64);

        // the unknown-date bucket sorts first and has no year
        assert_eq!(rows[0].published_year, None);
        assert_eq!(rows[0].count_companies, 0);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn skills_demand_matches_bridge_counts() {
        let schema = schema();
        let rows = skills_demand_rollup(&schema);
        let names: Vec<(&str, u64)> = rows
            .iter()
            .map(|r| (r.skill_name.as_str(), r.count_jobs_requiring_skill))
            .collect();
        // Scala has no bridge rows and is absent
        assert_eq!(names, vec![("SQL", 3), ("Python", 1)]);
        assert_eq!(rows[0].pct_of_total_jobs, 100.0);
        assert_eq!(rows[1].pct_of_total_jobs, 33.33);
        assert_eq!(rows[0].count_companies_requiring_skill, 2);
        assert_eq!(rows[0].avg_description_length, 11.67);
    }

    #[test]
    fn location_rollup_covers_referenced_locations() {
        let schema = schema();
        let rows = location_rollup(&schema);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].location_raw, "paris");
        assert_eq!(rows[0].count_job_offers, 2);
        assert_eq!(rows[0].data_engineer_count, 2);
        assert_eq!(rows[0].pct_remote, 100.0);
        assert_eq!(rows[1].data_analyst_count, 1);
        assert_eq!(rows[1].pct_remote, 0.0);
        let total: u64 = rows.iter().map(|r| r.count_job_offers).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn empty_schema_yields_empty_rollups() {
        let aggregated = aggregate(&StarSchema::default());
        assert_eq!(aggregated.aggregates, Aggregates::default());
        assert_eq!(aggregated.report.rows_out, 0);
    }
}
