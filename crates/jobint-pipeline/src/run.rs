use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use jobint_core::{JobintError, RowIssue, RunContext, Stage, StageReport};
use jobint_ingest::ingest_path;
use jobint_storage::TableStore;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::export::{self, TableFile, GOLD_DIR, MANIFEST_FILE, PARQUET_DIR};
use crate::modeling::UnknownMemberPolicy;
use crate::reference::ReferenceData;
use crate::skills::SkillScope;
use crate::{run_stages, PipelineOptions};

const REPORTS_DIR: &str = "reports";
const SUMMARY_JSON: &str = "run_summary.json";
const SUMMARY_MD: &str = "summary.md";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_path: String,
    pub skill_scope: SkillScope,
    pub unknown_members: UnknownMemberPolicy,
    pub stage_reports: Vec<StageReport>,
    /// Rows per published table, keyed by table name.
    pub table_row_counts: BTreeMap<String, usize>,
    pub data_dir: String,
    pub parquet_manifest: Option<String>,
}

impl RunSummary {
    pub fn stage_report(&self, stage: Stage) -> Option<&StageReport> {
        self.stage_reports.iter().find(|r| r.stage == stage)
    }

    fn markdown(&self) -> String {
        let mut lines = vec![
            "# Job Intelligence Run Summary".to_string(),
            String::new(),
            format!("- Run ID: `{}`", self.run_id),
            format!("- Started: {}", self.started_at),
            format!("- Finished: {}", self.finished_at),
            format!("- Source: `{}`", self.source_path),
            format!("- Skill scope: {}", self.skill_scope),
            format!("- Unknown members: {}", self.unknown_members),
            String::new(),
            "## Stages".to_string(),
            String::new(),
            "| stage | rows in | rows out | issues |".to_string(),
            "|---|---:|---:|---|".to_string(),
        ];
        for report in &self.stage_reports {
            lines.push(format!(
                "| {} | {} | {} | {} |",
                report.stage,
                report.rows_in,
                report.rows_out,
                describe_issues(report)
            ));
        }
        lines.push(String::new());
        lines.push("## Tables".to_string());
        lines.push(String::new());
        for (table, rows) in &self.table_row_counts {
            lines.push(format!("- {table}: {rows}"));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

fn issue_name(issue: RowIssue) -> &'static str {
    match issue {
        RowIssue::MalformedRow => "malformed_row",
        RowIssue::EmptyRow => "empty_row",
        RowIssue::UnparseableDate => "unparseable_date",
        RowIssue::DuplicateDropped => "duplicate_dropped",
        RowIssue::NoRuleMatch => "no_rule_match",
        RowIssue::UnparseableLocation => "unparseable_location",
        RowIssue::ReferentialGap => "referential_gap",
        RowIssue::ConstraintViolation => "constraint_violation",
    }
}

fn describe_issues(report: &StageReport) -> String {
    if report.issues.is_empty() {
        return "-".to_string();
    }
    report
        .issues
        .iter()
        .map(|(issue, count)| format!("{}={count}", issue_name(*issue)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct Pipeline {
    config: PipelineConfig,
    reference: ReferenceData,
    store: TableStore,
}

impl Pipeline {
    /// Load reference data from `config.rules_dir`, or the built-in set.
    pub fn new(config: PipelineConfig) -> Result<Self, JobintError> {
        let reference = match &config.rules_dir {
            Some(dir) => ReferenceData::from_dir(dir)?,
            None => ReferenceData::builtin()?,
        };
        Ok(Self::with_reference(config, reference))
    }

    pub fn with_reference(config: PipelineConfig, reference: ReferenceData) -> Self {
        let store = TableStore::new(config.data_dir.clone());
        Self {
            config,
            reference,
            store,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<RunSummary, JobintError> {
        self.run_with_context(RunContext::new()).await
    }

    /// Full run: ingest, transform, serialize every layer, then publish all
    /// tables and reports together. Nothing under the data root changes
    /// unless every step before the publish succeeded.
    pub async fn run_with_context(&self, ctx: RunContext) -> Result<RunSummary, JobintError> {
        let span = info_span!("run", run_id = %ctx.run_id);
        async move {
            info!(source = %self.config.source_path.display(), "run started");
            let ingested = info_span!("stage", stage = %Stage::Ingestion, run_id = %ctx.run_id)
                .in_scope(|| ingest_path(&self.config.source_path, &ctx))?;

            let outputs = run_stages(
                &ingested.records,
                &self.reference,
                &ctx,
                PipelineOptions::from(&self.config),
            );
            let mut stage_reports = vec![ingested.report];
            stage_reports.extend(outputs.reports.iter().cloned());

            let publish_err = |err: anyhow::Error| JobintError::stage(Stage::Publish, err);
            let mut tables =
                export::layer_csv_tables(&ingested.records, &outputs).map_err(publish_err)?;
            let table_row_counts: BTreeMap<String, usize> = tables
                .iter()
                .map(|t| (t.name.to_string(), t.rows))
                .collect();

            let parquet_dir = PathBuf::from(GOLD_DIR).join(PARQUET_DIR);
            let mut retired = Vec::new();
            let parquet_manifest = if self.config.write_parquet {
                tables.extend(
                    export::gold_parquet_tables(&outputs.schema, &outputs.aggregates, ctx.run_id)
                        .map_err(publish_err)?,
                );
                let manifest = self.config.data_dir.join(&parquet_dir).join(MANIFEST_FILE);
                Some(manifest.display().to_string())
            } else {
                // drop any snapshot an earlier run published
                retired.push(parquet_dir);
                None
            };

            let summary = RunSummary {
                run_id: ctx.run_id,
                started_at: ctx.started_at,
                finished_at: Utc::now(),
                source_path: self.config.source_path.display().to_string(),
                skill_scope: self.config.skill_scope,
                unknown_members: self.config.unknown_members,
                stage_reports,
                table_row_counts,
                data_dir: self.config.data_dir.display().to_string(),
                parquet_manifest,
            };
            tables.extend(report_files(&summary).map_err(publish_err)?);

            self.publish(ctx.run_id, &tables, &retired)
                .instrument(info_span!("stage", stage = %Stage::Publish, run_id = %ctx.run_id))
                .await
                .map_err(publish_err)?;

            info!(
                tables = summary.table_row_counts.len(),
                facts = outputs.schema.fact_job_offers.len(),
                "run complete"
            );
            Ok::<_, JobintError>(summary)
        }
        .instrument(span)
        .await
    }

    async fn publish(
        &self,
        run_id: Uuid,
        tables: &[TableFile],
        retired: &[PathBuf],
    ) -> anyhow::Result<()> {
        let mut staged = self.store.begin(run_id).await?;
        for path in retired {
            if let Err(err) = staged.retire(path) {
                staged.discard().await;
                return Err(err).with_context(|| format!("retiring {}", path.display()));
            }
        }
        for table in tables {
            if let Err(err) = staged.stage_bytes(&table.relative_path, &table.bytes).await {
                staged.discard().await;
                return Err(err).with_context(|| format!("staging table {}", table.name));
            }
        }
        staged.commit().await?;
        Ok(())
    }
}

fn report_files(summary: &RunSummary) -> anyhow::Result<Vec<TableFile>> {
    let dir = PathBuf::from(REPORTS_DIR).join(summary.run_id.to_string());
    let json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    Ok(vec![
        TableFile {
            name: "run_summary",
            relative_path: dir.join(SUMMARY_JSON),
            rows: 1,
            bytes: json,
        },
        TableFile {
            name: "summary",
            relative_path: dir.join(SUMMARY_MD),
            rows: 1,
            bytes: summary.markdown().into_bytes(),
        },
    ])
}

/// Markdown digest of the `runs` most recent run summaries under `data_dir`,
/// newest first.
pub fn report_markdown(data_dir: impl AsRef<Path>, runs: usize) -> anyhow::Result<String> {
    let reports_root = data_dir.as_ref().join(REPORTS_DIR);
    let mut summaries = Vec::new();
    for entry in std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
    {
        let entry = entry.with_context(|| format!("listing {}", reports_root.display()))?;
        let path = entry.path().join(SUMMARY_JSON);
        if !path.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let summary: RunSummary = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        summaries.push((path, summary));
    }
    summaries.sort_by(|(_, a), (_, b)| b.started_at.cmp(&a.started_at));

    let mut lines = vec!["# Job Intelligence Runs".to_string(), String::new()];
    for (path, summary) in summaries.into_iter().take(runs.max(1)) {
        let facts = summary
            .table_row_counts
            .get("fact_job_offers")
            .copied()
            .unwrap_or(0);
        let duplicates = summary
            .stage_report(Stage::Cleaning)
            .map_or(0, |r| r.count(RowIssue::DuplicateDropped));
        let ingested = summary
            .stage_report(Stage::Ingestion)
            .map_or(0, |r| r.rows_out);

        lines.push(format!("## Run `{}`", summary.run_id));
        lines.push(format!("- started: {}", summary.started_at));
        lines.push(format!("- ingested rows: {ingested}"));
        lines.push(format!("- duplicates dropped: {duplicates}"));
        lines.push(format!("- job offers: {facts}"));
        lines.push(format!("- summary: `{}`", path.display()));
        if let Some(manifest) = &summary.parquet_manifest {
            lines.push(format!("- parquet manifest: `{manifest}`"));
        }
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}
