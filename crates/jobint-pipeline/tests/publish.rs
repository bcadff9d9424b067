use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use jobint_core::{JobintError, RowIssue, RunContext, Stage};
use jobint_pipeline::{
    report_markdown, ParquetManifest, Pipeline, PipelineConfig, SkillScope, UnknownMemberPolicy,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn ctx(n: u128, at: &str) -> RunContext {
    let at = DateTime::parse_from_rfc3339(at).unwrap().with_timezone(&Utc);
    RunContext::fixed(Uuid::from_u128(n), at)
}

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/sample_jobs.csv")
}

fn config(data_dir: &Path, source: PathBuf) -> PipelineConfig {
    PipelineConfig {
        source_path: source,
        data_dir: data_dir.to_path_buf(),
        rules_dir: None,
        skill_scope: SkillScope::Description,
        unknown_members: UnknownMemberPolicy::Sentinel,
        write_parquet: true,
    }
}

#[tokio::test]
async fn run_publishes_every_layer_and_reports() {
    let data = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(data.path(), fixture_path())).unwrap();
    let run = ctx(1, "2026-01-07T09:00:00Z");
    let summary = pipeline.run_with_context(run).await.expect("run succeeds");

    for rel in [
        "bronze/stg_jobs_raw.csv",
        "silver/int_jobs_cleaned.csv",
        "silver/int_job_title_normalization.csv",
        "silver/int_skills_extraction.csv",
        "gold/dim_time.csv",
        "gold/fact_job_offers.csv",
        "gold/agg_skills_demand.csv",
        "gold/parquet/fact_job_skills.parquet",
        "gold/parquet/manifest.json",
    ] {
        assert!(data.path().join(rel).is_file(), "missing {rel}");
    }
    let reports = data.path().join("reports").join(run.run_id.to_string());
    assert!(reports.join("run_summary.json").is_file());
    assert!(reports.join("summary.md").is_file());
    assert!(!data.path().join(".staging").exists());

    assert_eq!(summary.table_row_counts["stg_jobs_raw"], 6);
    assert_eq!(summary.table_row_counts["int_jobs_cleaned"], 6);
    assert_eq!(summary.table_row_counts["fact_job_offers"], 5);
    assert_eq!(summary.stage_reports.len(), 7);
    assert_eq!(summary.stage_reports[0].stage, Stage::Ingestion);

    let facts = std::fs::read_to_string(data.path().join("gold/fact_job_offers.csv")).unwrap();
    assert!(facts.lines().next().unwrap().starts_with("job_offer_id,company_id,location_id"));
    assert_eq!(facts.lines().count(), 6);
}

#[tokio::test]
async fn manifest_hashes_match_published_parquet_files() {
    let data = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(data.path(), fixture_path())).unwrap();
    pipeline
        .run_with_context(ctx(2, "2026-01-07T09:00:00Z"))
        .await
        .unwrap();

    let parquet_dir = data.path().join("gold/parquet");
    let manifest: ParquetManifest =
        serde_json::from_slice(&std::fs::read(parquet_dir.join("manifest.json")).unwrap())
            .unwrap();
    assert_eq!(manifest.files.len(), 9);
    for file in &manifest.files {
        let bytes = std::fs::read(parquet_dir.join(&file.path)).unwrap();
        assert_eq!(file.bytes, bytes.len() as u64);
        assert_eq!(file.sha256, hex::encode(Sha256::digest(&bytes)));
    }

    // same snapshot, same run identity, same bytes
    let again = tempfile::tempdir().unwrap();
    Pipeline::new(config(again.path(), fixture_path()))
        .unwrap()
        .run_with_context(ctx(2, "2026-01-07T09:00:00Z"))
        .await
        .unwrap();
    let second: ParquetManifest = serde_json::from_slice(
        &std::fs::read(again.path().join("gold/parquet/manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest, second);
}

#[tokio::test]
async fn failed_run_leaves_previous_output_untouched() {
    let data = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(data.path(), fixture_path())).unwrap();
    pipeline
        .run_with_context(ctx(3, "2026-01-07T09:00:00Z"))
        .await
        .unwrap();
    let facts_path = data.path().join("gold/fact_job_offers.csv");
    let before = std::fs::read(&facts_path).unwrap();

    let missing = data.path().join("no_such_snapshot.csv");
    let broken = Pipeline::new(config(data.path(), missing.clone())).unwrap();
    let err = broken
        .run_with_context(ctx(4, "2026-01-08T09:00:00Z"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobintError::SourceNotFound(ref path) if *path == missing));
    assert_eq!(err.halted_stage(), Some(Stage::Ingestion));

    let header_only = data.path().join("bad_header.csv");
    std::fs::write(&header_only, "job_title,location\nData Engineer,Paris\n").unwrap();
    let mismatched = Pipeline::new(config(data.path(), header_only)).unwrap();
    let err = mismatched
        .run_with_context(ctx(5, "2026-01-09T09:00:00Z"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobintError::SchemaMismatch { .. }));

    assert_eq!(std::fs::read(&facts_path).unwrap(), before);
    assert!(!data.path().join("reports/00000000-0000-0000-0000-000000000004").exists());
    assert!(!data.path().join(".staging").exists());
}

#[tokio::test]
async fn missing_rules_directory_halts_before_any_output() {
    let data = tempfile::tempdir().unwrap();
    let mut config = config(data.path(), fixture_path());
    config.rules_dir = Some(data.path().join("rules"));
    let err = Pipeline::new(config).err().expect("rules dir is missing");
    assert_eq!(err.halted_stage(), Some(Stage::Categorization));
    assert!(std::fs::read_dir(data.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn report_lists_recent_runs_newest_first() {
    let data = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(data.path(), fixture_path())).unwrap();
    let older = ctx(10, "2026-01-07T09:00:00Z");
    let newer = ctx(11, "2026-01-08T09:00:00Z");
    pipeline.run_with_context(older).await.unwrap();
    pipeline.run_with_context(newer).await.unwrap();

    let text = report_markdown(data.path(), 5).unwrap();
    let newer_at = text.find(&newer.run_id.to_string()).unwrap();
    let older_at = text.find(&older.run_id.to_string()).unwrap();
    assert!(newer_at < older_at);
    assert!(text.contains("- job offers: 5"));
    assert!(text.contains("- duplicates dropped: 1"));

    let latest_only = report_markdown(data.path(), 1).unwrap();
    assert!(!latest_only.contains(&older.run_id.to_string()));
}

#[tokio::test]
async fn failed_commit_restores_layers_already_replaced() {
    let data = tempfile::tempdir().unwrap();
    Pipeline::new(config(data.path(), fixture_path()))
        .unwrap()
        .run_with_context(ctx(20, "2026-01-07T09:00:00Z"))
        .await
        .unwrap();
    let layers = [
        "bronze/stg_jobs_raw.csv",
        "silver/int_jobs_cleaned.csv",
        "silver/int_skills_extraction.csv",
        "gold/dim_company.csv",
    ];
    let before: Vec<Vec<u8>> = layers
        .iter()
        .map(|rel| std::fs::read(data.path().join(rel)).unwrap())
        .collect();

    // a directory squatting on a gold table path fails the commit after bronze
    // and silver were already moved into place
    let facts = data.path().join("gold/fact_job_offers.csv");
    std::fs::remove_file(&facts).unwrap();
    std::fs::create_dir_all(facts.join("occupied")).unwrap();

    let err = Pipeline::new(config(data.path(), project_fixture("title_only_skill.csv")))
        .unwrap()
        .run_with_context(ctx(21, "2026-01-08T09:00:00Z"))
        .await
        .unwrap_err();
    assert_eq!(err.halted_stage(), Some(Stage::Publish));

    for (rel, bytes) in layers.iter().zip(&before) {
        assert_eq!(&std::fs::read(data.path().join(rel)).unwrap(), bytes, "{rel} changed");
    }
    assert!(facts.join("occupied").is_dir());
    assert!(!data.path().join("reports/00000000-0000-0000-0000-000000000015").exists());
    assert!(!data.path().join(".staging").exists());
}

fn project_fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures").join(name)
}

#[tokio::test]
async fn empty_tables_are_published_with_headers() {
    let data = tempfile::tempdir().unwrap();
    let summary = Pipeline::new(config(data.path(), project_fixture("title_only_skill.csv")))
        .unwrap()
        .run_with_context(ctx(30, "2026-01-07T09:00:00Z"))
        .await
        .unwrap();
    assert_eq!(summary.table_row_counts["fact_job_skills"], 0);
    assert_eq!(summary.table_row_counts["agg_skills_demand"], 0);

    let bridge = std::fs::read_to_string(data.path().join("gold/fact_job_skills.csv")).unwrap();
    assert_eq!(bridge, "job_skill_id,job_offer_id,skill_id,skill_name,created_at\n");
    let demand = std::fs::read_to_string(data.path().join("gold/agg_skills_demand.csv")).unwrap();
    assert!(demand.starts_with("skill_id,skill_name,"));
    assert_eq!(demand.lines().count(), 1);
}

#[tokio::test]
async fn disabling_parquet_removes_the_previous_snapshot() {
    let data = tempfile::tempdir().unwrap();
    Pipeline::new(config(data.path(), fixture_path()))
        .unwrap()
        .run_with_context(ctx(40, "2026-01-07T09:00:00Z"))
        .await
        .unwrap();
    assert!(data.path().join("gold/parquet/manifest.json").is_file());

    let mut csv_only = config(data.path(), fixture_path());
    csv_only.write_parquet = false;
    let summary = Pipeline::new(csv_only)
        .unwrap()
        .run_with_context(ctx(41, "2026-01-08T09:00:00Z"))
        .await
        .unwrap();
    assert!(summary.parquet_manifest.is_none());
    assert!(!data.path().join("gold/parquet").exists());
    assert!(data.path().join("gold/fact_job_offers.csv").is_file());
}

#[tokio::test]
async fn summary_carries_validation_report() {
    let data = tempfile::tempdir().unwrap();
    let summary = Pipeline::new(config(data.path(), fixture_path()))
        .unwrap()
        .run_with_context(ctx(50, "2026-01-07T09:00:00Z"))
        .await
        .unwrap();
    let validation = summary.stage_report(Stage::Validation).expect("validation report");
    assert_eq!(validation.count(RowIssue::ConstraintViolation), 0);
    let markdown = std::fs::read_to_string(
        data.path()
            .join("reports")
            .join(Uuid::from_u128(50).to_string())
            .join("summary.md"),
    )
    .unwrap();
    assert!(markdown.contains("| validation |"));
}
