//! Ingestion normalizer: reads the flat scraped-postings CSV into bronze
//! `RawJobRecord`s stamped with run metadata.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use jobint_core::{JobintError, RawJobRecord, RowIssue, RunContext, Stage, StageReport};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

pub const CRATE_NAME: &str = "jobint-ingest";

/// Canonical bronze columns, in source order.
pub const CANONICAL_COLUMNS: [&str; 10] = [
    "job_title",
    "location",
    "posted_time",
    "published_at",
    "job_url",
    "company_name",
    "company_url",
    "job_description",
    "contract_type",
    "work_type",
];

/// Alternate header spellings seen in scraper exports, keyed by canonical column.
const COLUMN_ALIASES: [(&str, &[&str]); 10] = [
    ("job_title", &["title", "position", "job_name"]),
    ("location", &["job_location", "place"]),
    ("posted_time", &["posted", "time_posted", "posted_ago"]),
    ("published_at", &["published", "publication_date", "date_posted", "posted_at"]),
    ("job_url", &["url", "link", "job_link"]),
    ("company_name", &["company"]),
    ("company_url", &["company_link", "company_linkedin_url"]),
    ("job_description", &["description", "job_desc"]),
    ("contract_type", &["contract", "employment_type"]),
    ("work_type", &["workplace_type", "work_mode", "remote_type"]),
];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("missing columns [{}]", .missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },
    #[error("reading source: {0}")]
    Io(#[from] io::Error),
    #[error("decoding source: {0}")]
    Csv(#[from] csv::Error),
}

impl From<IngestError> for JobintError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::SourceNotFound(path) => JobintError::SourceNotFound(path),
            IngestError::SchemaMismatch { missing } => JobintError::SchemaMismatch { missing },
            other => JobintError::stage(Stage::Ingestion, other),
        }
    }
}

/// Bronze output plus the stage's row accounting.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub records: Vec<RawJobRecord>,
    pub report: StageReport,
}

/// Read the source file at `path`.
pub fn ingest_path(path: impl AsRef<Path>, ctx: &RunContext) -> Result<Ingested, IngestError> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(IngestError::SourceNotFound(path.to_path_buf()))
        }
        Err(err) => return Err(IngestError::Io(err)),
    };
    let span = info_span!("ingest", run_id = %ctx.run_id, source = %path.display());
    let _guard = span.enter();
    ingest_reader(file, ctx)
}

/// Read CSV from any reader. Headers are remapped onto [`CANONICAL_COLUMNS`].
pub fn ingest_reader<R: Read>(reader: R, ctx: &RunContext) -> Result<Ingested, IngestError> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let positions = resolve_columns(rdr.headers()?)?;

    let mut report = StageReport::new(Stage::Ingestion);
    let mut records = Vec::new();

    for (ordinal, result) in rdr.records().enumerate() {
        report.rows_in += 1;
        let row = match result {
            Ok(row) => row,
            Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => return Err(err.into()),
            Err(err) => {
                warn!(row = ordinal, error = %err, "skipping undecodable source row");
                report.record(RowIssue::MalformedRow);
                continue;
            }
        };

        let record = to_raw_record(&row, &positions, ordinal as u64, ctx);
        if record.is_structurally_empty() {
            debug!(row = ordinal, "dropping structurally empty row");
            report.record(RowIssue::EmptyRow);
            continue;
        }
        records.push(record);
    }

    report.rows_out = records.len() as u64;
    info!(
        rows_read = report.rows_in,
        rows_kept = report.rows_out,
        empty = report.count(RowIssue::EmptyRow),
        malformed = report.count(RowIssue::MalformedRow),
        "ingestion complete"
    );
    Ok(Ingested { records, report })
}

/// Collapse a header to lowercase alphanumerics so `Job Title`, `job-title`
/// and `jobTitle` compare equal.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Map each canonical column to its index in the source header row.
fn resolve_columns(headers: &StringRecord) -> Result<[usize; 10], IngestError> {
    let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
    let mut positions = [0usize; 10];
    let mut missing = Vec::new();

    for (slot, (canonical, aliases)) in COLUMN_ALIASES.iter().enumerate() {
        let found = std::iter::once(*canonical)
            .chain(aliases.iter().copied())
            .map(normalize_header)
            .find_map(|wanted| normalized.iter().position(|h| *h == wanted));
        match found {
            Some(idx) => positions[slot] = idx,
            None => missing.push((*canonical).to_string()),
        }
    }

    if missing.is_empty() {
        Ok(positions)
    } else {
        Err(IngestError::SchemaMismatch { missing })
    }
}

fn cell(row: &StringRecord, idx: usize) -> Option<String> {
    row.get(idx)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn to_raw_record(
    row: &StringRecord,
    positions: &[usize; 10],
    source_row: u64,
    ctx: &RunContext,
) -> RawJobRecord {
    RawJobRecord {
        job_title: cell(row, positions[0]),
        location: cell(row, positions[1]),
        posted_time: cell(row, positions[2]),
        published_at: cell(row, positions[3]),
        job_url: cell(row, positions[4]),
        company_name: cell(row, positions[5]),
        company_url: cell(row, positions[6]),
        job_description: cell(row, positions[7]),
        contract_type: cell(row, positions[8]),
        work_type: cell(row, positions[9]),
        ingestion_timestamp: ctx.started_at,
        run_id: ctx.run_id,
        source_row,
    }
}
