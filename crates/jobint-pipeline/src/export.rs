//! Layer serialization: CSV for every table, Parquet plus a hashed manifest for
//! the gold layer.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, RecordBatch,
    StringArray, UInt32Array, UInt64Array,
};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use jobint_core::{
    CategoryTimeAggregate, CleanedJobRecord, CompanyDim, JobOfferFact, JobSkillFact,
    LocationAggregate, LocationDim, NormalizedJobRecord, RawJobRecord, SkillDemandAggregate,
    SkillDim, TimeDim,
};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::aggregate::Aggregates;
use crate::modeling::StarSchema;
use crate::skills::{skill_extraction_rows, SkillExtractionRow};
use crate::LayerOutputs;

pub const BRONZE_DIR: &str = "bronze";
pub const SILVER_DIR: &str = "silver";
pub const GOLD_DIR: &str = "gold";
pub const PARQUET_DIR: &str = "parquet";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Serialized table ready to be staged under the data root.
#[derive(Debug, Clone)]
pub struct TableFile {
    pub name: &'static str,
    pub relative_path: PathBuf,
    pub rows: usize,
    pub bytes: Vec<u8>,
}

impl TableFile {
    fn new(dir: PathBuf, name: &'static str, ext: &str, rows: usize, bytes: Vec<u8>) -> Self {
        Self {
            name,
            relative_path: dir.join(format!("{name}.{ext}")),
            rows,
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Column names a table row serializes to, in field order. The header is
/// written from this list so an empty table still carries its schema.
pub trait CsvColumns {
    const COLUMNS: &'static [&'static str];
}

macro_rules! csv_columns {
    ($($row:ty => [$($column:literal),+ $(,)?];)+) => {
        $(impl CsvColumns for $row {
            const COLUMNS: &'static [&'static str] = &[$($column),+];
        })+
    };
}

csv_columns! {
    RawJobRecord => [
        "job_title", "location", "posted_time", "published_at", "job_url", "company_name",
        "company_url", "job_description", "contract_type", "work_type", "ingestion_timestamp",
        "run_id", "source_row",
    ];
    CleanedJobRecord => [
        "job_title_cleaned", "location_cleaned", "company_name_cleaned",
        "job_description_cleaned", "contract_type_cleaned", "work_type_cleaned", "job_url",
        "company_url", "published_date", "posted_time", "published_year_month",
        "published_year", "published_month", "natural_key", "dedup_rank", "source_row",
        "ingestion_timestamp",
    ];
    NormalizedJobRecord => [
        "job_title_cleaned", "job_category", "contract_type_normalized",
        "work_type_normalized", "location_cleaned", "company_name_cleaned",
        "job_description_cleaned", "contract_type_cleaned", "work_type_cleaned", "job_url",
        "company_url", "published_date", "posted_time", "published_year_month",
        "published_year", "published_month", "natural_key", "source_row",
        "ingestion_timestamp",
    ];
    SkillExtractionRow => [
        "natural_key", "job_title_cleaned", "location_cleaned", "company_name_cleaned",
        "published_date", "job_category", "skill_name", "skill_category", "has_skill",
        "matched_in",
    ];
    TimeDim => [
        "date_id", "date", "year", "month", "quarter", "week", "day_of_week", "day_name",
        "month_name", "quarter_name", "month_start", "quarter_start", "year_start",
        "created_at",
    ];
    CompanyDim => ["company_id", "company_name", "company_url", "created_at"];
    LocationDim => [
        "location_id", "location_raw", "city", "country", "work_location_type", "created_at",
    ];
    SkillDim => ["skill_id", "skill_name", "skill_category", "created_at"];
    JobOfferFact => [
        "job_offer_id", "company_id", "location_id", "published_date_id", "job_title",
        "job_category", "contract_type", "work_type", "job_url", "company_url",
        "job_description", "published_date", "posted_time", "published_year_month",
        "published_year", "published_month", "description_length", "word_count", "is_remote",
        "is_permanent", "created_at",
    ];
    JobSkillFact => ["job_skill_id", "job_offer_id", "skill_id", "skill_name", "created_at"];
    CategoryTimeAggregate => [
        "published_year", "published_month", "published_year_month", "job_category",
        "contract_type", "work_type", "count_job_offers", "count_companies",
        "avg_description_length", "avg_word_count", "remote_jobs", "permanent_jobs",
    ];
    SkillDemandAggregate => [
        "skill_id", "skill_name", "skill_category", "count_jobs_requiring_skill",
        "count_companies_requiring_skill", "pct_of_total_jobs", "avg_description_length",
    ];
    LocationAggregate => [
        "location_id", "location_raw", "city", "country", "work_location_type",
        "count_job_offers", "count_companies", "data_engineer_count", "data_scientist_count",
        "data_analyst_count", "ml_engineer_count", "pct_remote",
    ];
}

/// Header plus one record per row; an empty table is just the header line.
pub fn csv_bytes<T: Serialize + CsvColumns>(rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(T::COLUMNS)
        .context("writing csv header")?;
    for row in rows {
        writer.serialize(row).context("serializing csv row")?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flushing csv writer: {}", err.error()))
}

fn csv_table<T: Serialize + CsvColumns>(dir: &str, name: &'static str, rows: &[T]) -> Result<TableFile> {
    let bytes = csv_bytes(rows).with_context(|| format!("writing {name} csv"))?;
    Ok(TableFile::new(PathBuf::from(dir), name, "csv", rows.len(), bytes))
}

/// Every bronze, silver and gold table as CSV, in layer order.
pub fn layer_csv_tables(raw: &[RawJobRecord], outputs: &LayerOutputs) -> Result<Vec<TableFile>> {
    let schema = &outputs.schema;
    let aggregates = &outputs.aggregates;
    let extraction = skill_extraction_rows(&outputs.normalized, &outputs.skills);
    Ok(vec![
        csv_table(BRONZE_DIR, "stg_jobs_raw", raw)?,
        csv_table(SILVER_DIR, "int_jobs_cleaned", &outputs.cleaned)?,
        csv_table(SILVER_DIR, "int_job_title_normalization", &outputs.normalized)?,
        csv_table(SILVER_DIR, "int_skills_extraction", &extraction)?,
        csv_table(GOLD_DIR, "dim_time", &schema.dim_time)?,
        csv_table(GOLD_DIR, "dim_company", &schema.dim_company)?,
        csv_table(GOLD_DIR, "dim_location", &schema.dim_location)?,
        csv_table(GOLD_DIR, "dim_skills", &schema.dim_skills)?,
        csv_table(GOLD_DIR, "fact_job_offers", &schema.fact_job_offers)?,
        csv_table(GOLD_DIR, "fact_job_skills", &schema.fact_job_skills)?,
        csv_table(GOLD_DIR, "agg_job_offers_by_category_time", &aggregates.by_category_time)?,
        csv_table(GOLD_DIR, "agg_skills_demand", &aggregates.skills_demand)?,
        csv_table(GOLD_DIR, "agg_location_analysis", &aggregates.location_analysis)?,
    ])
}

/// Columns accumulated for one record batch.
#[derive(Default)]
struct Columns {
    fields: Vec<ArrowField>,
    arrays: Vec<ArrayRef>,
}

impl Columns {
    fn push(mut self, name: &str, data_type: DataType, nullable: bool, array: ArrayRef) -> Self {
        self.fields.push(ArrowField::new(name, data_type, nullable));
        self.arrays.push(array);
        self
    }

    fn int64(self, name: &str, values: impl Iterator<Item = i64>) -> Self {
        let array = Int64Array::from(values.collect::<Vec<_>>());
        self.push(name, DataType::Int64, false, Arc::new(array))
    }

    fn uint32(self, name: &str, values: impl Iterator<Item = u32>) -> Self {
        let array = UInt32Array::from(values.collect::<Vec<_>>());
        self.push(name, DataType::UInt32, false, Arc::new(array))
    }

    fn opt_uint32(self, name: &str, values: impl Iterator<Item = Option<u32>>) -> Self {
        let array = UInt32Array::from(values.collect::<Vec<_>>());
        self.push(name, DataType::UInt32, true, Arc::new(array))
    }

    fn opt_int32(self, name: &str, values: impl Iterator<Item = Option<i32>>) -> Self {
        let array = Int32Array::from(values.collect::<Vec<_>>());
        self.push(name, DataType::Int32, true, Arc::new(array))
    }

    fn uint64(self, name: &str, values: impl Iterator<Item = u64>) -> Self {
        let array = UInt64Array::from(values.collect::<Vec<_>>());
        self.push(name, DataType::UInt64, false, Arc::new(array))
    }

    fn float64(self, name: &str, values: impl Iterator<Item = f64>) -> Self {
        let array = Float64Array::from(values.collect::<Vec<_>>());
        self.push(name, DataType::Float64, false, Arc::new(array))
    }

    fn boolean(self, name: &str, values: impl Iterator<Item = bool>) -> Self {
        let array = BooleanArray::from(values.collect::<Vec<_>>());
        self.push(name, DataType::Boolean, false, Arc::new(array))
    }

    fn utf8<'a>(self, name: &str, values: impl Iterator<Item = &'a str>) -> Self {
        let array = StringArray::from(values.map(Some).collect::<Vec<_>>());
        self.push(name, DataType::Utf8, false, Arc::new(array))
    }

    fn opt_utf8<'a>(self, name: &str, values: impl Iterator<Item = Option<&'a str>>) -> Self {
        let array = StringArray::from(values.collect::<Vec<_>>());
        self.push(name, DataType::Utf8, true, Arc::new(array))
    }

    fn date(self, name: &str, values: impl Iterator<Item = Option<NaiveDate>>) -> Self {
        let array = Date32Array::from(values.map(|d| d.map(days_since_epoch)).collect::<Vec<_>>());
        self.push(name, DataType::Date32, true, Arc::new(array))
    }

    fn timestamp(self, name: &str, values: impl Iterator<Item = DateTime<Utc>>) -> Self {
        let array = StringArray::from(values.map(|t| Some(t.to_rfc3339())).collect::<Vec<_>>());
        self.push(name, DataType::Utf8, false, Arc::new(array))
    }

    fn finish(self, table: &str) -> Result<RecordBatch> {
        RecordBatch::try_new(Arc::new(Schema::new(self.fields)), self.arrays)
            .with_context(|| format!("building {table} record batch"))
    }
}

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn parquet_bytes(table: &str, batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None)
        .with_context(|| format!("opening parquet writer for {table}"))?;
    writer
        .write(batch)
        .with_context(|| format!("writing record batch {table}"))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer for {table}"))?;
    Ok(buffer)
}

fn gold_batches(schema: &StarSchema, aggregates: &Aggregates) -> Result<Vec<(&'static str, RecordBatch)>> {
    let time = &schema.dim_time;
    let dim_time = Columns::default()
        .int64("date_id", time.iter().map(|r| r.date_id))
        .date("date", time.iter().map(|r| r.date))
        .opt_int32("year", time.iter().map(|r| r.year))
        .opt_uint32("month", time.iter().map(|r| r.month))
        .opt_uint32("quarter", time.iter().map(|r| r.quarter))
        .opt_uint32("week", time.iter().map(|r| r.week))
        .opt_uint32("day_of_week", time.iter().map(|r| r.day_of_week))
        .utf8("day_name", time.iter().map(|r| r.day_name.as_str()))
        .utf8("month_name", time.iter().map(|r| r.month_name.as_str()))
        .utf8("quarter_name", time.iter().map(|r| r.quarter_name.as_str()))
        .date("month_start", time.iter().map(|r| r.month_start))
        .date("quarter_start", time.iter().map(|r| r.quarter_start))
        .date("year_start", time.iter().map(|r| r.year_start))
        .timestamp("created_at", time.iter().map(|r| r.created_at))
        .finish("dim_time")?;

    let company = &schema.dim_company;
    let dim_company = Columns::default()
        .int64("company_id", company.iter().map(|r| r.company_id))
        .utf8("company_name", company.iter().map(|r| r.company_name.as_str()))
        .opt_utf8("company_url", company.iter().map(|r| r.company_url.as_deref()))
        .timestamp("created_at", company.iter().map(|r| r.created_at))
        .finish("dim_company")?;

    let location = &schema.dim_location;
    let dim_location = Columns::default()
        .int64("location_id", location.iter().map(|r| r.location_id))
        .utf8("location_raw", location.iter().map(|r| r.location_raw.as_str()))
        .utf8("city", location.iter().map(|r| r.city.as_str()))
        .utf8("country", location.iter().map(|r| r.country.as_str()))
        .utf8(
            "work_location_type",
            location.iter().map(|r| r.work_location_type.label()),
        )
        .timestamp("created_at", location.iter().map(|r| r.created_at))
        .finish("dim_location")?;

    let skills = &schema.dim_skills;
    let dim_skills = Columns::default()
        .int64("skill_id", skills.iter().map(|r| r.skill_id))
        .utf8("skill_name", skills.iter().map(|r| r.skill_name.as_str()))
        .utf8("skill_category", skills.iter().map(|r| r.skill_category.label()))
        .timestamp("created_at", skills.iter().map(|r| r.created_at))
        .finish("dim_skills")?;

    let facts = &schema.fact_job_offers;
    let fact_job_offers = Columns::default()
        .int64("job_offer_id", facts.iter().map(|r| r.job_offer_id))
        .int64("company_id", facts.iter().map(|r| r.company_id))
        .int64("location_id", facts.iter().map(|r| r.location_id))
        .int64("published_date_id", facts.iter().map(|r| r.published_date_id))
        .opt_utf8("job_title", facts.iter().map(|r| r.job_title.as_deref()))
        .utf8("job_category", facts.iter().map(|r| r.job_category.label()))
        .utf8("contract_type", facts.iter().map(|r| r.contract_type.label()))
        .utf8("work_type", facts.iter().map(|r| r.work_type.label()))
        .opt_utf8("job_url", facts.iter().map(|r| r.job_url.as_deref()))
        .opt_utf8("company_url", facts.iter().map(|r| r.company_url.as_deref()))
        .opt_utf8("job_description", facts.iter().map(|r| r.job_description.as_deref()))
        .date("published_date", facts.iter().map(|r| r.published_date))
        .opt_utf8("posted_time", facts.iter().map(|r| r.posted_time.as_deref()))
        .date("published_year_month", facts.iter().map(|r| r.published_year_month))
        .opt_int32("published_year", facts.iter().map(|r| r.published_year))
        .opt_uint32("published_month", facts.iter().map(|r| r.published_month))
        .uint32("description_length", facts.iter().map(|r| r.description_length))
        .uint32("word_count", facts.iter().map(|r| r.word_count))
        .boolean("is_remote", facts.iter().map(|r| r.is_remote))
        .boolean("is_permanent", facts.iter().map(|r| r.is_permanent))
        .timestamp("created_at", facts.iter().map(|r| r.created_at))
        .finish("fact_job_offers")?;

    let bridge = &schema.fact_job_skills;
    let fact_job_skills = Columns::default()
        .int64("job_skill_id", bridge.iter().map(|r| r.job_skill_id))
        .int64("job_offer_id", bridge.iter().map(|r| r.job_offer_id))
        .int64("skill_id", bridge.iter().map(|r| r.skill_id))
        .utf8("skill_name", bridge.iter().map(|r| r.skill_name.as_str()))
        .timestamp("created_at", bridge.iter().map(|r| r.created_at))
        .finish("fact_job_skills")?;

    let by_time = &aggregates.by_category_time;
    let agg_by_time = Columns::default()
        .opt_int32("published_year", by_time.iter().map(|r| r.published_year))
        .opt_uint32("published_month", by_time.iter().map(|r| r.published_month))
        .date("published_year_month", by_time.iter().map(|r| r.published_year_month))
        .utf8("job_category", by_time.iter().map(|r| r.job_category.label()))
        .utf8("contract_type", by_time.iter().map(|r| r.contract_type.label()))
        .utf8("work_type", by_time.iter().map(|r| r.work_type.label()))
        .uint64("count_job_offers", by_time.iter().map(|r| r.count_job_offers))
        .uint64("count_companies", by_time.iter().map(|r| r.count_companies))
        .float64("avg_description_length", by_time.iter().map(|r| r.avg_description_length))
        .float64("avg_word_count", by_time.iter().map(|r| r.avg_word_count))
        .uint64("remote_jobs", by_time.iter().map(|r| r.remote_jobs))
        .uint64("permanent_jobs", by_time.iter().map(|r| r.permanent_jobs))
        .finish("agg_job_offers_by_category_time")?;

    let demand = &aggregates.skills_demand;
    let agg_skills = Columns::default()
        .int64("skill_id", demand.iter().map(|r| r.skill_id))
        .utf8("skill_name", demand.iter().map(|r| r.skill_name.as_str()))
        .utf8("skill_category", demand.iter().map(|r| r.skill_category.label()))
        .uint64(
            "count_jobs_requiring_skill",
            demand.iter().map(|r| r.count_jobs_requiring_skill),
        )
        .uint64(
            "count_companies_requiring_skill",
            demand.iter().map(|r| r.count_companies_requiring_skill),
        )
        .float64("pct_of_total_jobs", demand.iter().map(|r| r.pct_of_total_jobs))
        .float64("avg_description_length", demand.iter().map(|r| r.avg_description_length))
        .finish("agg_skills_demand")?;

    let locations = &aggregates.location_analysis;
    let agg_locations = Columns::default()
        .int64("location_id", locations.iter().map(|r| r.location_id))
        .utf8("location_raw", locations.iter().map(|r| r.location_raw.as_str()))
        .utf8("city", locations.iter().map(|r| r.city.as_str()))
        .utf8("country", locations.iter().map(|r| r.country.as_str()))
        .utf8(
            "work_location_type",
            locations.iter().map(|r| r.work_location_type.label()),
        )
        .uint64("count_job_offers", locations.iter().map(|r| r.count_job_offers))
        .uint64("count_companies", locations.iter().map(|r| r.count_companies))
        .uint64("data_engineer_count", locations.iter().map(|r| r.data_engineer_count))
        .uint64("data_scientist_count", locations.iter().map(|r| r.data_scientist_count))
        .uint64("data_analyst_count", locations.iter().map(|r| r.data_analyst_count))
        .uint64("ml_engineer_count", locations.iter().map(|r| r.ml_engineer_count))
        .float64("pct_remote", locations.iter().map(|r| r.pct_remote))
        .finish("agg_location_analysis")?;

    Ok(vec![
        ("dim_time", dim_time),
        ("dim_company", dim_company),
        ("dim_location", dim_location),
        ("dim_skills", dim_skills),
        ("fact_job_offers", fact_job_offers),
        ("fact_job_skills", fact_job_skills),
        ("agg_job_offers_by_category_time", agg_by_time),
        ("agg_skills_demand", agg_skills),
        ("agg_location_analysis", agg_locations),
    ])
}

fn manifest_entry(table: &TableFile) -> ParquetManifestFile {
    let mut hasher = Sha256::new();
    hasher.update(&table.bytes);
    ParquetManifestFile {
        name: table.name.to_string(),
        path: format!("{}.parquet", table.name),
        sha256: hex::encode(hasher.finalize()),
        bytes: table.bytes.len() as u64,
    }
}

/// Gold Parquet snapshot: one file per gold table followed by `manifest.json`.
pub fn gold_parquet_tables(
    schema: &StarSchema,
    aggregates: &Aggregates,
    run_id: Uuid,
) -> Result<Vec<TableFile>> {
    let dir = PathBuf::from(GOLD_DIR).join(PARQUET_DIR);
    let mut tables = Vec::new();
    for (name, batch) in gold_batches(schema, aggregates)? {
        let bytes = parquet_bytes(name, &batch)?;
        tables.push(TableFile::new(dir.clone(), name, "parquet", batch.num_rows(), bytes));
    }

    let manifest = ParquetManifest {
        schema_version: 1,
        run_id,
        files: tables.iter().map(manifest_entry).collect(),
    };
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    tables.push(TableFile {
        name: "manifest",
        relative_path: dir.join(MANIFEST_FILE),
        rows: manifest.files.len(),
        bytes,
    });
    Ok(tables)
}
