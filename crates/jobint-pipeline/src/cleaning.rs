//! Cleaning & deduplication: text normalization, defensive date parsing and
//! `dedup_rank` assignment over the natural key.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use jobint_core::{CleanedJobRecord, RawJobRecord, RowIssue, Stage, StageReport};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

#[derive(Debug, Clone)]
pub struct Cleaned {
    /// Every cleaned row, in source order, each carrying its rank.
    pub records: Vec<CleanedJobRecord>,
    pub report: StageReport,
}

impl Cleaned {
    pub fn rank_one(&self) -> impl Iterator<Item = &CleanedJobRecord> {
        self.records.iter().filter(|r| r.dedup_rank == 1)
    }
}

/// `lowercase(trim(value))`; null stays null and blank collapses to null.
pub fn clean_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Calendar date of `value` under the first format that accepts it.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        })
}

/// Digest over the length-prefixed cleaned key fields; null and empty differ.
pub fn natural_key(
    title: Option<&str>,
    company: Option<&str>,
    location: Option<&str>,
    description: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    for field in [title, company, location, description] {
        match field {
            None => hasher.update([0u8]),
            Some(value) => {
                hasher.update([1u8]);
                hasher.update((value.len() as u64).to_le_bytes());
                hasher.update(value.as_bytes());
            }
        }
    }
    hex::encode(hasher.finalize())
}

fn clean_record(raw: &RawJobRecord, report: &mut StageReport) -> CleanedJobRecord {
    let job_title_cleaned = clean_text(raw.job_title.as_deref());
    let location_cleaned = clean_text(raw.location.as_deref());
    let company_name_cleaned = clean_text(raw.company_name.as_deref());
    let job_description_cleaned = clean_text(raw.job_description.as_deref());

    let published_date = match raw.published_at.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => {
            let parsed = parse_date(value);
            if parsed.is_none() {
                debug!(row = raw.source_row, value, "unparseable published date");
                report.record(RowIssue::UnparseableDate);
            }
            parsed
        }
    };

    let natural_key = natural_key(
        job_title_cleaned.as_deref(),
        company_name_cleaned.as_deref(),
        location_cleaned.as_deref(),
        job_description_cleaned.as_deref(),
    );

    CleanedJobRecord {
        job_title_cleaned,
        location_cleaned,
        company_name_cleaned,
        job_description_cleaned,
        contract_type_cleaned: clean_text(raw.contract_type.as_deref()),
        work_type_cleaned: clean_text(raw.work_type.as_deref()),
        job_url: raw.job_url.clone(),
        company_url: raw.company_url.clone(),
        published_date,
        posted_time: raw.posted_time.clone(),
        published_year_month: published_date.and_then(|d| d.with_day(1)),
        published_year: published_date.map(|d| d.year()),
        published_month: published_date.map(|d| d.month()),
        natural_key,
        dedup_rank: 0,
        source_row: raw.source_row,
        ingestion_timestamp: raw.ingestion_timestamp,
    }
}

/// Rank every record within its natural-key partition: newest published date
/// first, null dates last, ties broken by source order. Ranks are computed over
/// the whole input, never per shard.
pub fn assign_dedup_ranks(records: &mut [CleanedJobRecord]) {
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&a, &b| {
        let (ra, rb) = (&records[a], &records[b]);
        ra.natural_key
            .cmp(&rb.natural_key)
            .then_with(|| ra.published_date.is_none().cmp(&rb.published_date.is_none()))
            .then_with(|| rb.published_date.cmp(&ra.published_date))
            .then_with(|| ra.source_row.cmp(&rb.source_row))
    });

    let mut ranks = vec![0u32; records.len()];
    let mut current: Option<&str> = None;
    let mut rank = 0u32;
    for &idx in &order {
        let key = records[idx].natural_key.as_str();
        if current == Some(key) {
            rank += 1;
        } else {
            current = Some(key);
            rank = 1;
        }
        ranks[idx] = rank;
    }

    for (record, rank) in records.iter_mut().zip(ranks) {
        record.dedup_rank = rank;
    }
}

pub fn clean_and_dedup(raw: &[RawJobRecord]) -> Cleaned {
    let mut report = StageReport::new(Stage::Cleaning);
    report.rows_in = raw.len() as u64;

    let mut records: Vec<CleanedJobRecord> = raw
        .iter()
        .map(|record| clean_record(record, &mut report))
        .collect();
    assign_dedup_ranks(&mut records);

    for _ in records.iter().filter(|r| r.dedup_rank > 1) {
        report.record(RowIssue::DuplicateDropped);
    }
    report.rows_out = records.iter().filter(|r| r.dedup_rank == 1).count() as u64;
    info!(
        rows_in = report.rows_in,
        unique = report.rows_out,
        duplicates = report.count(RowIssue::DuplicateDropped),
        unparseable_dates = report.count(RowIssue::UnparseableDate),
        "cleaning complete"
    );

    Cleaned { records, report }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn raw(row: u64, title: &str, published_at: Option<&str>) -> RawJobRecord {
        RawJobRecord {
            job_title: Some(title.to_string()),
            location: Some("Paris, France".into()),
            posted_time: None,
            published_at: published_at.map(str::to_string),
            job_url: Some(format!("https://jobs.example/{row}")),
            company_name: Some("Acme".into()),
            company_url: None,
            job_description: Some("python".into()),
            contract_type: None,
            work_type: None,
            ingestion_timestamp: Utc::now(),
            run_id: Uuid::nil(),
            source_row: row,
        }
    }

    #[test]
    fn clean_text_is_null_safe() {
        assert_eq!(clean_text(None), None);
        assert_eq!(clean_text(Some("   ")), None);
        assert_eq!(clean_text(Some("  Data ENGINEER ")), Some("data engineer".into()));
        assert_eq!(clean_text(Some(" ÉTUDE Données ")), Some("étude données".into()));
        assert_eq!(clean_text(Some("None")), Some("none".into()));
    }

    #[test]
    fn dates_parse_across_supported_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        for value in [
            "2024-03-15",
            "2024-03-15T08:30:00Z",
            "2024-03-15T08:30:00+02:00",
            "2024-03-15 08:30:00",
            "2024-03-15T08:30:00",
            "2024-03-15T08:30:00.123",
            "2024/03/15",
            "15/03/2024",
            "15-03-2024",
            " 2024-03-15 ",
        ] {
            assert_eq!(parse_date(value), Some(expected), "format {value}");
        }
        assert_eq!(parse_date("2 days ago"), None);
        assert_eq!(parse_date("2024-13-40"), None);
    }

    #[test]
    fn unparseable_date_degrades_to_null_and_is_counted() {
        let cleaned = clean_and_dedup(&[raw(0, "Data Engineer", Some("yesterday"))]);
        let record = &cleaned.records[0];
        assert_eq!(record.published_date, None);
        assert_eq!(record.published_year, None);
        assert_eq!(record.dedup_rank, 1);
        assert_eq!(cleaned.report.count(RowIssue::UnparseableDate), 1);
    }

    #[test]
    fn year_month_columns_derive_from_date() {
        let cleaned = clean_and_dedup(&[raw(0, "Data Engineer", Some("2024-03-15"))]);
        let record = &cleaned.records[0];
        assert_eq!(
            record.published_year_month,
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(record.published_year, Some(2024));
        assert_eq!(record.published_month, Some(3));
    }

    #[test]
    fn natural_key_distinguishes_null_from_empty_and_shifts() {
        assert_ne!(
            natural_key(None, Some("a"), None, None),
            natural_key(Some(""), Some("a"), None, None)
        );
        assert_ne!(
            natural_key(Some("ab"), Some("c"), None, None),
            natural_key(Some("a"), Some("bc"), None, None)
        );
    }

    #[test]
    fn newest_record_wins_and_null_dates_rank_last() {
        let cleaned = clean_and_dedup(&[
            raw(0, "Data Engineer", None),
            raw(1, "data engineer ", Some("2024-03-10")),
            raw(2, " DATA ENGINEER", Some("2024-03-15")),
        ]);
        let ranks: Vec<u32> = cleaned.records.iter().map(|r| r.dedup_rank).collect();
        assert_eq!(ranks, vec![3, 2, 1]);
        assert_eq!(cleaned.report.rows_out, 1);
        assert_eq!(cleaned.report.count(RowIssue::DuplicateDropped), 2);
    }

    #[test]
    fn equal_dates_tie_break_on_source_order() {
        let cleaned = clean_and_dedup(&[
            raw(4, "Data Engineer", Some("2024-03-15")),
            raw(9, "Data Engineer", Some("2024-03-15")),
            raw(2, "Data Engineer", Some("2024-03-15")),
        ]);
        let winner = cleaned.rank_one().next().unwrap();
        assert_eq!(winner.source_row, 2);
    }

    #[test]
    fn exactly_one_rank_one_per_natural_key() {
        let titles = ["a", "b", "a", "c", "b", "a", "d"];
        let dates = [Some("2024-01-01"), None, Some("2024-01-02"), None, None, Some("bad"), None];
        let input: Vec<_> = titles
            .iter()
            .zip(dates)
            .enumerate()
            .map(|(i, (t, d))| raw(i as u64, t, d))
            .collect();
        let cleaned = clean_and_dedup(&input);

        let mut rank_ones: HashMap<&str, usize> = HashMap::new();
        for record in &cleaned.records {
            if record.dedup_rank == 1 {
                *rank_ones.entry(record.natural_key.as_str()).or_default() += 1;
            }
        }
        assert_eq!(rank_ones.len(), 4);
        assert!(rank_ones.values().all(|&n| n == 1));
    }
}
